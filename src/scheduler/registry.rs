//! Host registry: the single owner of hosts, their series and their jobs.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::task::JoinHandle;

use crate::db::{
    Event, Host, HostId, HostStatus, PingResult, Series, Snapshot, Statistics, TimeRange,
    TracerouteResult,
};

/// Status a host takes after a probe.
///
/// A clean exit that yielded no round-trip times counts as a warning.
pub fn derive_status(result: &PingResult) -> HostStatus {
    if result.success && !result.indeterminate && result.packet_loss < 10.0 {
        HostStatus::Running
    } else if result.packet_loss > 50.0 {
        HostStatus::Failed
    } else {
        HostStatus::Warning
    }
}

/// A running probe task and the generation it was started with.
struct Job {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Entry {
    host: Host,
    series: Series,
    job: Option<Job>,
}

/// Status transition caused by an applied probe.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub host: Host,
    pub previous: HostStatus,
}

pub struct Registry {
    entries: BTreeMap<HostId, Entry>,
    next_id: HostId,
    next_generation: u64,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
            next_generation: 1,
            capacity,
        }
    }

    /// Rebuild from persisted state. No jobs are running afterwards.
    pub fn from_snapshot(snapshot: Snapshot, capacity: usize) -> Self {
        let mut registry = Self::new(capacity);
        let mut series: BTreeMap<HostId, Vec<PingResult>> = snapshot.series.into_iter().collect();

        for host in snapshot.hosts {
            registry.next_id = registry.next_id.max(host.id + 1);
            let entries = series.remove(&host.id).unwrap_or_default();
            registry.entries.insert(
                host.id,
                Entry {
                    host,
                    series: Series::from_entries(entries, capacity),
                    job: None,
                },
            );
        }

        registry
    }

    pub fn insert(&mut self, target: &str, alias: &str, interval_secs: u64) -> Host {
        let id = self.next_id;
        self.next_id += 1;

        let host = Host::new(id, target, alias, interval_secs);
        self.entries.insert(
            id,
            Entry {
                host: host.clone(),
                series: Series::with_capacity(self.capacity),
                job: None,
            },
        );
        host
    }

    pub fn get(&self, id: HostId) -> Option<&Host> {
        self.entries.get(&id).map(|e| &e.host)
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.entries.values().map(|e| e.host.clone()).collect()
    }

    pub fn series(&self, id: HostId) -> Option<&Series> {
        self.entries.get(&id).map(|e| &e.series)
    }

    /// Ids of hosts whose persisted status says they were being monitored.
    pub fn monitored_ids(&self) -> Vec<HostId> {
        self.entries
            .values()
            .filter(|e| e.host.status.is_monitored())
            .map(|e| e.host.id)
            .collect()
    }

    pub fn has_job(&self, id: HostId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.job.is_some())
    }

    /// Reserve a fresh generation for a new job.
    pub fn next_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Install a job, cancelling any previous one, and mark the host running.
    pub fn install_job(&mut self, id: HostId, generation: u64, handle: JoinHandle<()>) {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                if let Some(old) = entry.job.replace(Job { generation, handle }) {
                    old.handle.abort();
                }
                entry.host.status = HostStatus::Running;
            }
            None => handle.abort(),
        }
    }

    /// Cancel the host's job and mark it stopped. Returns false if unknown.
    pub fn stop(&mut self, id: HostId) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if let Some(job) = entry.job.take() {
            job.handle.abort();
        }
        entry.host.status = HostStatus::Stopped;
        true
    }

    /// Cancel every job without touching host status.
    pub fn abort_all(&mut self) {
        for entry in self.entries.values_mut() {
            if let Some(job) = entry.job.take() {
                job.handle.abort();
            }
        }
    }

    pub fn remove(&mut self, id: HostId) -> Option<Host> {
        let entry = self.entries.remove(&id)?;
        if let Some(job) = entry.job {
            job.handle.abort();
        }
        Some(entry.host)
    }

    fn current_entry(&mut self, id: HostId, generation: u64) -> Option<&mut Entry> {
        self.entries
            .get_mut(&id)
            .filter(|e| e.job.as_ref().is_some_and(|j| j.generation == generation))
    }

    /// Record a probe result if the job that produced it is still current.
    pub fn apply_ping(&mut self, id: HostId, generation: u64, result: PingResult) -> Option<StatusChange> {
        let entry = self.current_entry(id, generation)?;
        let previous = entry.host.status;

        entry.host.last_ping = Some(result.timestamp);
        entry.host.avg_time = result.avg_time;
        entry.host.packet_loss = result.packet_loss;
        entry.host.status = derive_status(&result);
        entry.series.append(result);

        Some(StatusChange {
            host: entry.host.clone(),
            previous,
        })
    }

    /// Attach a traceroute to the result recorded at `timestamp`.
    pub fn attach_traceroute(
        &mut self,
        id: HostId,
        generation: u64,
        timestamp: DateTime<Utc>,
        traceroute: TracerouteResult,
    ) -> bool {
        match self.current_entry(id, generation) {
            Some(entry) => entry.series.attach_traceroute(timestamp, traceroute),
            None => false,
        }
    }

    pub fn statistics(&self, id: HostId, range: &TimeRange) -> Option<Statistics> {
        self.series(id).map(|s| s.statistics(range))
    }

    /// Failures and high-loss results, newest first. `host` narrows the
    /// search to one host.
    pub fn recent_events(&self, host: Option<HostId>, limit: usize) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .entries
            .values()
            .filter(|entry| host.map_or(true, |id| entry.host.id == id))
            .flat_map(|entry| {
                entry
                    .series
                    .iter()
                    .filter(|r| !r.success || r.packet_loss > 10.0)
                    .map(|r| Event {
                        host_id: entry.host.id,
                        alias: entry.host.alias.clone(),
                        timestamp: r.timestamp,
                        message: if r.success {
                            format!("high packet loss: {:.1}%", r.packet_loss)
                        } else {
                            "ping failed".to_string()
                        },
                    })
            })
            .collect();

        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        events
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            hosts: self.hosts(),
            series: self
                .entries
                .values()
                .map(|e| (e.host.id, e.series.iter().cloned().collect()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Quality;

    fn ok_result(id: HostId, avg: f64, loss: f64) -> PingResult {
        let mut r = PingResult::failure(id, "x", 4, "");
        r.success = true;
        r.error = None;
        r.avg_time = avg;
        r.packet_loss = loss;
        r.quality = Quality::Good;
        r
    }

    #[test]
    fn test_derive_status() {
        assert_eq!(derive_status(&ok_result(1, 10.0, 0.0)), HostStatus::Running);
        assert_eq!(derive_status(&ok_result(1, 10.0, 25.0)), HostStatus::Warning);
        assert_eq!(derive_status(&ok_result(1, 10.0, 75.0)), HostStatus::Failed);
        assert_eq!(derive_status(&PingResult::failure(1, "x", 4, "")), HostStatus::Failed);

        let mut blank = ok_result(1, 0.0, 0.0);
        blank.indeterminate = true;
        assert_eq!(derive_status(&blank), HostStatus::Warning);
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let mut registry = Registry::new(10);
        let host = registry.insert("example.com", "", 5);

        let first = registry.next_generation();
        registry.install_job(host.id, first, tokio::spawn(async {}));
        let second = registry.next_generation();
        registry.install_job(host.id, second, tokio::spawn(async {}));

        assert!(registry.apply_ping(host.id, first, ok_result(host.id, 1.0, 0.0)).is_none());
        assert!(registry.apply_ping(host.id, second, ok_result(host.id, 1.0, 0.0)).is_some());
        assert_eq!(registry.series(host.id).unwrap().len(), 1);

        registry.stop(host.id);
        assert!(registry.apply_ping(host.id, second, ok_result(host.id, 1.0, 0.0)).is_none());
        assert_eq!(registry.get(host.id).unwrap().status, HostStatus::Stopped);
    }

    #[tokio::test]
    async fn test_apply_updates_cached_fields() {
        let mut registry = Registry::new(10);
        let host = registry.insert("example.com", "Example", 5);
        let generation = registry.next_generation();
        registry.install_job(host.id, generation, tokio::spawn(async {}));

        let change = registry
            .apply_ping(host.id, generation, ok_result(host.id, 42.0, 75.0))
            .unwrap();
        assert_eq!(change.previous, HostStatus::Running);
        assert_eq!(change.host.status, HostStatus::Failed);
        assert_eq!(change.host.avg_time, 42.0);
        assert_eq!(change.host.packet_loss, 75.0);
        assert!(change.host.last_ping.is_some());
    }

    #[test]
    fn test_recent_events_for_one_host() {
        let mut registry = Registry::new(10);
        let quiet = registry.insert("a.example", "A", 5);
        let flaky = registry.insert("b.example", "B", 5);
        let base = Utc::now();
        for (i, id) in [quiet.id, flaky.id, flaky.id].into_iter().enumerate() {
            let mut r = PingResult::failure(id, "x", 4, "down");
            r.timestamp = base + chrono::Duration::seconds(i as i64);
            registry.entries.get_mut(&id).unwrap().series.append(r);
        }

        assert_eq!(registry.recent_events(None, 10).len(), 3);
        let events = registry.recent_events(Some(flaky.id), 10);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.host_id == flaky.id && e.alias == "B"));
        assert_eq!(registry.recent_events(Some(quiet.id), 10).len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip_restores_ids() {
        let mut registry = Registry::new(10);
        registry.insert("a.example", "", 1);
        let b = registry.insert("b.example", "", 1);

        let restored = Registry::from_snapshot(registry.snapshot(), 10);
        assert_eq!(restored.hosts().len(), 2);

        let mut restored = restored;
        let c = restored.insert("c.example", "", 1);
        assert!(c.id > b.id);
    }

    #[test]
    fn test_recent_events() {
        let mut registry = Registry::new(10);
        let host = registry.insert("example.com", "Example", 5);
        let entry = registry.entries.get_mut(&host.id).unwrap();
        let base = Utc::now();
        let results = [
            ok_result(host.id, 5.0, 0.0),
            ok_result(host.id, 5.0, 25.0),
            PingResult::failure(host.id, "example.com", 4, "down"),
        ];
        for (i, mut r) in results.into_iter().enumerate() {
            r.timestamp = base + chrono::Duration::seconds(i as i64);
            entry.series.append(r);
        }

        let events = registry.recent_events(None, 10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "ping failed");
        assert_eq!(events[1].message, "high packet loss: 25.0%");
        assert_eq!(registry.recent_events(None, 1).len(), 1);
    }
}
