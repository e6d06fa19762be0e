//! Bounded per-host history of ping results.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;

use super::models::{PingResult, Statistics, TracerouteResult};

/// Default number of results kept per host.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Time window used by queries and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// Everything newer than `span` before `now`.
    pub fn last(span: ChronoDuration, now: DateTime<Utc>) -> Self {
        Self {
            from: Some(now - span),
            to: None,
        }
    }

    /// Parse a dashboard preset such as `1h`, `6h`, `24h`, `7d` or `30d`.
    pub fn preset(name: &str, now: DateTime<Utc>) -> Option<Self> {
        let span = match name {
            "1h" => ChronoDuration::hours(1),
            "6h" => ChronoDuration::hours(6),
            "24h" => ChronoDuration::days(1),
            "7d" => ChronoDuration::days(7),
            "30d" => ChronoDuration::days(30),
            _ => return None,
        };
        Some(Self::last(span, now))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts <= to)
    }
}

/// FIFO ring of results; the oldest entry is evicted once full.
#[derive(Debug, Clone)]
pub struct Series {
    entries: VecDeque<PingResult>,
    capacity: usize,
}

impl Default for Series {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Series {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Rebuild a series from persisted entries, keeping only the newest ones.
    pub fn from_entries(entries: Vec<PingResult>, capacity: usize) -> Self {
        let mut series = Self::with_capacity(capacity);
        for entry in entries {
            series.append(entry);
        }
        series
    }

    pub fn append(&mut self, result: PingResult) {
        self.entries.push_back(result);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PingResult> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&PingResult> {
        self.entries.back()
    }

    /// Entries inside `range`, oldest first.
    pub fn query(&self, range: &TimeRange) -> Vec<PingResult> {
        self.entries
            .iter()
            .filter(|r| range.contains(r.timestamp))
            .cloned()
            .collect()
    }

    /// Attach a traceroute to the entry recorded at `timestamp`.
    ///
    /// Returns false if that entry has already been evicted.
    pub fn attach_traceroute(&mut self, timestamp: DateTime<Utc>, traceroute: TracerouteResult) -> bool {
        match self.entries.iter_mut().rev().find(|r| r.timestamp == timestamp) {
            Some(entry) => {
                entry.traceroute = Some(traceroute);
                true
            }
            None => false,
        }
    }

    pub fn statistics(&self, range: &TimeRange) -> Statistics {
        let mut stats = Statistics::default();
        let mut latency_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut timed = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for r in self.entries.iter().filter(|r| range.contains(r.timestamp)) {
            stats.total_count += 1;
            loss_sum += r.packet_loss;
            if r.success {
                stats.success_count += 1;
            }
            // Indeterminate results count as reachable but carry no latency.
            if r.success && !r.indeterminate {
                timed += 1;
                latency_sum += r.avg_time;
                min = min.min(r.avg_time);
                max = max.max(r.avg_time);
            }
        }

        if stats.total_count == 0 {
            return stats;
        }

        stats.success_rate = stats.success_count as f64 / stats.total_count as f64 * 100.0;
        stats.avg_packet_loss = loss_sum / stats.total_count as f64;
        if timed > 0 {
            stats.avg_time = latency_sum / timed as f64;
            stats.min_time = min;
            stats.max_time = max;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Quality;
    use chrono::TimeZone;

    fn result_at(secs: i64, success: bool, avg: f64, loss: f64) -> PingResult {
        PingResult {
            host_id: 1,
            target: "example.com".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            success,
            times: if success { vec![avg] } else { Vec::new() },
            packets_transmitted: 4,
            packets_received: if success { 4 } else { 0 },
            packet_loss: loss,
            min_time: avg,
            avg_time: avg,
            max_time: avg,
            quality: Quality::Good,
            indeterminate: false,
            error: None,
            traceroute: None,
        }
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let mut series = Series::with_capacity(1000);
        for i in 0..1001 {
            series.append(result_at(i, true, i as f64, 0.0));
        }

        assert_eq!(series.len(), 1000);
        let first = series.iter().next().unwrap();
        assert_eq!(first.avg_time, 1.0);
        let ordered = series
            .iter()
            .zip(series.iter().skip(1))
            .all(|(a, b)| a.timestamp < b.timestamp);
        assert!(ordered);
    }

    #[test]
    fn test_query_inclusive_range() {
        let mut series = Series::default();
        for i in 0..10 {
            series.append(result_at(i * 60, true, 10.0, 0.0));
        }

        let from = Utc.timestamp_opt(1_700_000_000 + 120, 0).unwrap();
        let to = Utc.timestamp_opt(1_700_000_000 + 300, 0).unwrap();
        let hits = series.query(&TimeRange::between(Some(from), Some(to)));

        assert_eq!(hits.len(), 4);
        assert_eq!(hits.first().unwrap().timestamp, from);
        assert_eq!(hits.last().unwrap().timestamp, to);
    }

    #[test]
    fn test_statistics_empty_is_zero() {
        let series = Series::default();
        assert_eq!(series.statistics(&TimeRange::all()), Statistics::default());
    }

    #[test]
    fn test_statistics_mixed() {
        let mut series = Series::default();
        series.append(result_at(0, true, 10.0, 0.0));
        series.append(result_at(1, true, 30.0, 25.0));
        series.append(result_at(2, false, 0.0, 100.0));
        series.append(result_at(3, true, 20.0, 0.0));

        let stats = series.statistics(&TimeRange::all());
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.success_count, 3);
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.avg_time, 20.0);
        assert_eq!(stats.min_time, 10.0);
        assert_eq!(stats.max_time, 30.0);
        assert_eq!(stats.avg_packet_loss, 31.25);
    }

    #[test]
    fn test_statistics_skip_indeterminate_latency() {
        let mut series = Series::default();
        series.append(result_at(0, true, 40.0, 0.0));
        let mut blank = result_at(1, true, 0.0, 0.0);
        blank.indeterminate = true;
        series.append(blank);

        let stats = series.statistics(&TimeRange::all());
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.success_rate, 100.0);
        assert_eq!(stats.avg_time, 40.0);
        assert_eq!(stats.min_time, 40.0);
        assert_eq!(stats.max_time, 40.0);

        let mut only_blank = Series::default();
        let mut blank = result_at(0, true, 0.0, 0.0);
        blank.indeterminate = true;
        only_blank.append(blank);
        let stats = only_blank.statistics(&TimeRange::all());
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.avg_time, 0.0);
        assert_eq!(stats.min_time, 0.0);
        assert_eq!(stats.max_time, 0.0);
    }

    #[test]
    fn test_statistics_all_failed() {
        let mut series = Series::default();
        series.append(result_at(0, false, 0.0, 100.0));

        let stats = series.statistics(&TimeRange::all());
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.min_time, 0.0);
        assert_eq!(stats.max_time, 0.0);
        assert_eq!(stats.avg_packet_loss, 100.0);
    }

    #[test]
    fn test_attach_traceroute_by_timestamp() {
        let mut series = Series::default();
        series.append(result_at(0, false, 0.0, 100.0));
        series.append(result_at(1, true, 5.0, 0.0));
        let ts = series.iter().next().unwrap().timestamp;

        let trace = TracerouteResult {
            target: "example.com".to_string(),
            timestamp: Utc::now(),
            success: true,
            output: String::new(),
            error: None,
            hops: Vec::new(),
            bottleneck: None,
        };
        assert!(series.attach_traceroute(ts, trace.clone()));
        assert!(series.iter().next().unwrap().traceroute.is_some());
        assert!(series.latest().unwrap().traceroute.is_none());

        let missing = Utc.timestamp_opt(0, 0).unwrap();
        assert!(!series.attach_traceroute(missing, trace));
    }

    #[test]
    fn test_presets() {
        let now = Utc::now();
        let range = TimeRange::preset("6h", now).unwrap();
        assert_eq!(range.from, Some(now - ChronoDuration::hours(6)));
        assert!(TimeRange::preset("2w", now).is_none());
    }
}
