//! Data model types shared by the prober, the scheduler and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type HostId = i64;

/// Monitoring state of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Stopped,
    Running,
    Warning,
    Failed,
}

impl HostStatus {
    /// Whether the host has a live probe job.
    pub fn is_monitored(self) -> bool {
        self != HostStatus::Stopped
    }

    pub fn is_offline(self) -> bool {
        self == HostStatus::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostStatus::Stopped => "stopped",
            HostStatus::Running => "running",
            HostStatus::Warning => "warning",
            HostStatus::Failed => "failed",
        }
    }
}

/// A monitored host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub target: String,
    pub alias: String,
    pub interval_secs: u64,
    pub status: HostStatus,
    pub last_ping: Option<DateTime<Utc>>,
    /// Average latency of the last probe, in milliseconds.
    pub avg_time: f64,
    /// Packet loss of the last probe, in percent.
    pub packet_loss: f64,
}

impl Host {
    pub fn new(id: HostId, target: &str, alias: &str, interval_secs: u64) -> Self {
        let alias = alias.trim();
        Self {
            id,
            target: target.trim().to_string(),
            alias: if alias.is_empty() {
                target.trim().to_string()
            } else {
                alias.to_string()
            },
            interval_secs: interval_secs.max(1),
            status: HostStatus::Stopped,
            last_ping: None,
            avg_time: 0.0,
            packet_loss: 0.0,
        }
    }
}

/// Qualitative link grade derived from a ping result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Poor,
    Fair,
    Good,
    Excellent,
}

/// One router reported by traceroute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub hop: u32,
    pub host: String,
    /// Mean response time in milliseconds, 0 when nothing answered.
    pub time: f64,
}

/// Outcome of one traceroute run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteResult {
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub hops: Vec<Hop>,
    pub bottleneck: Option<Hop>,
}

/// Outcome of one ping run.
///
/// A failed result always carries no samples, zero latencies and 100% loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    pub host_id: HostId,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub times: Vec<f64>,
    pub packets_transmitted: u32,
    pub packets_received: u32,
    pub packet_loss: f64,
    pub min_time: f64,
    pub avg_time: f64,
    pub max_time: f64,
    pub quality: Quality,
    /// Set when the tool exited cleanly but no round-trip time could be read.
    pub indeterminate: bool,
    pub error: Option<String>,
    pub traceroute: Option<TracerouteResult>,
}

impl PingResult {
    /// Build a failed result with the given error description.
    pub fn failure(host_id: HostId, target: &str, transmitted: u32, error: impl Into<String>) -> Self {
        Self {
            host_id,
            target: target.to_string(),
            timestamp: Utc::now(),
            success: false,
            times: Vec::new(),
            packets_transmitted: transmitted,
            packets_received: 0,
            packet_loss: 100.0,
            min_time: 0.0,
            avg_time: 0.0,
            max_time: 0.0,
            quality: Quality::Poor,
            indeterminate: false,
            error: Some(error.into()),
            traceroute: None,
        }
    }

    /// Whether this result warrants a follow-up traceroute.
    pub fn needs_traceroute(&self) -> bool {
        !self.success || self.packet_loss > 50.0
    }
}

/// Aggregates over a window of a host's series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_count: usize,
    pub success_count: usize,
    pub success_rate: f64,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    pub avg_packet_loss: f64,
}

/// A notable probe outcome surfaced to dashboards and reports.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub host_id: HostId,
    pub alias: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub hosts: Vec<Host>,
    pub series: Vec<(HostId, Vec<PingResult>)>,
}
