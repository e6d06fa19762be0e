//! pynk - host reachability and latency monitor.
//!
//! Periodically runs the system `ping` and `traceroute` tools against a set of
//! hosts, parses their output and keeps a bounded history per host.

pub mod config;
pub mod db;
pub mod probe;
pub mod scheduler;
pub mod web;

pub use config::ServerConfig;
pub use db::{Host, HostStatus, PingResult, Statistics, TimeRange, TracerouteResult};
pub use probe::{Prober, ProbeConfig};
pub use scheduler::{LogNotifier, MonitorError, Scheduler, SchedulerConfig};
