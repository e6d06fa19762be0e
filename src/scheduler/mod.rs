//! Scheduler module: one recurring probe job per monitored host.

mod notify;
mod registry;

pub use notify::*;
pub use registry::*;

use crate::db::{
    Event, Host, HostId, PingResult, StatePersistence, Statistics, TimeRange, TracerouteResult,
    DEFAULT_CAPACITY,
};
use crate::probe::{Prober, MONITOR_BOTTLENECK_THRESHOLD_MS, VISUAL_BOTTLENECK_THRESHOLD_MS};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// Errors returned by registry commands and queries.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("host {0} not found")]
    HostNotFound(HostId),
    #[error("invalid host: {0}")]
    InvalidHost(String),
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Results kept per host.
    pub history_capacity: usize,
    /// Upper bound of the random delay before each scheduled probe.
    pub probe_jitter: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_CAPACITY,
            probe_jitter: Duration::from_millis(100),
        }
    }
}

/// The main scheduler that owns the host registry and drives probe jobs.
///
/// Cloning is cheap; all clones share the same registry.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<Mutex<Registry>>,
    prober: Prober,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    writer: StateWriter,
    persist_tx: mpsc::Sender<()>,
}

impl Scheduler {
    /// Create a scheduler with an empty registry.
    ///
    /// Spawns the background state writer, so this must run inside a tokio
    /// runtime.
    pub fn new(
        prober: Prober,
        persistence: Arc<dyn StatePersistence>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        let registry = Arc::new(Mutex::new(Registry::new(config.history_capacity)));
        let writer = StateWriter {
            registry: registry.clone(),
            persistence,
            lock: Arc::new(Mutex::new(())),
        };
        // One pending request is enough: the writer always saves the latest state.
        let (persist_tx, persist_rx) = mpsc::channel(1);
        tokio::spawn(run_state_writer(persist_rx, writer.clone()));

        Self {
            registry,
            prober,
            notifier,
            config,
            writer,
            persist_tx,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load saved state and restart monitoring for hosts that were active.
    ///
    /// Returns the number of restored hosts.
    pub fn restore(&self) -> Result<usize, crate::db::DbError> {
        let Some(snapshot) = self.writer.persistence.load_state()? else {
            tracing::info!("Scheduler: no saved state, starting empty");
            return Ok(0);
        };

        let monitored = {
            let mut registry = self.registry();
            registry.abort_all();
            *registry = Registry::from_snapshot(snapshot, self.config.history_capacity);
            registry.monitored_ids()
        };
        let total = self.registry().hosts().len();
        tracing::info!(
            "Scheduler: restored {} hosts, resuming {} jobs",
            total,
            monitored.len()
        );

        for id in monitored {
            let scheduler = self.clone();
            tokio::spawn(async move {
                if let Err(e) = scheduler.start(id).await {
                    tracing::error!("Scheduler: failed to resume host {}: {}", id, e);
                }
            });
        }

        Ok(total)
    }

    /// Register a host and start monitoring it.
    ///
    /// Returns once the first probe has been recorded.
    pub async fn add_host(&self, target: &str, alias: &str, interval_secs: u64) -> Result<Host, MonitorError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(MonitorError::InvalidHost("target must not be empty".to_string()));
        }
        if target.chars().any(char::is_whitespace) || target.starts_with('-') {
            return Err(MonitorError::InvalidHost(format!("{:?} is not a host name or address", target)));
        }
        if interval_secs < 1 {
            return Err(MonitorError::InvalidHost("interval must be at least 1 second".to_string()));
        }

        let host = self.registry().insert(target, alias, interval_secs);
        tracing::info!("Scheduler: Adding host {} ({})", host.alias, host.target);
        self.persist();

        self.start(host.id).await?;
        self.get_host(host.id)
    }

    /// Start (or restart) monitoring a host.
    ///
    /// Any existing job for the host is cancelled first, so a host never has
    /// two timers. Waits for the immediate first probe.
    pub async fn start(&self, id: HostId) -> Result<(), MonitorError> {
        let first_probe = {
            let mut registry = self.registry();
            let host = registry.get(id).ok_or(MonitorError::HostNotFound(id))?.clone();
            let generation = registry.next_generation();
            let (tx, rx) = oneshot::channel();

            let job = self.clone().run_job(host.clone(), generation, tx);
            registry.install_job(id, generation, tokio::spawn(job));
            tracing::info!(
                "Scheduler: monitoring {} every {}s (job {})",
                host.alias,
                host.interval_secs,
                generation
            );
            rx
        };
        self.persist();

        // The sender is dropped without a value if the job is cancelled first.
        let _ = first_probe.await;
        Ok(())
    }

    /// Stop monitoring a host. Stopping a stopped host is a no-op.
    pub fn stop(&self, id: HostId) -> Result<(), MonitorError> {
        if !self.registry().stop(id) {
            return Err(MonitorError::HostNotFound(id));
        }
        tracing::info!("Scheduler: stopped host {}", id);
        self.persist();
        Ok(())
    }

    /// Stop a monitored host or start a stopped one.
    pub async fn toggle_monitoring(&self, id: HostId) -> Result<Host, MonitorError> {
        let monitored = self.get_host(id)?.status.is_monitored();
        if monitored {
            self.stop(id)?;
        } else {
            self.start(id).await?;
        }
        self.get_host(id)
    }

    /// Stop a host and discard it along with its history.
    pub fn remove_host(&self, id: HostId) -> Result<Host, MonitorError> {
        let host = self.registry().remove(id).ok_or(MonitorError::HostNotFound(id))?;
        tracing::info!("Scheduler: Removed host {} ({})", host.alias, id);
        self.persist();
        Ok(host)
    }

    /// Cancel every job, leaving statuses as they are so a restart resumes them.
    ///
    /// State is saved before this returns.
    pub fn shutdown(&self) {
        self.registry().abort_all();
        self.writer.flush();
    }

    pub fn list_hosts(&self) -> Vec<Host> {
        self.registry().hosts()
    }

    pub fn get_host(&self, id: HostId) -> Result<Host, MonitorError> {
        self.registry().get(id).cloned().ok_or(MonitorError::HostNotFound(id))
    }

    /// Results for a host inside `range`, oldest first.
    pub fn get_series(&self, id: HostId, range: &TimeRange) -> Result<Vec<PingResult>, MonitorError> {
        self.registry()
            .series(id)
            .map(|s| s.query(range))
            .ok_or(MonitorError::HostNotFound(id))
    }

    pub fn get_statistics(&self, id: HostId, range: &TimeRange) -> Result<Statistics, MonitorError> {
        self.registry()
            .statistics(id, range)
            .ok_or(MonitorError::HostNotFound(id))
    }

    /// Failure and high-loss events, newest first, optionally for one host.
    pub fn recent_events(&self, host_id: Option<HostId>, limit: usize) -> Result<Vec<Event>, MonitorError> {
        let registry = self.registry();
        if let Some(id) = host_id {
            if registry.get(id).is_none() {
                return Err(MonitorError::HostNotFound(id));
            }
        }
        Ok(registry.recent_events(host_id, limit))
    }

    /// Run a one-off traceroute for display. Nothing is recorded.
    pub async fn traceroute(&self, target: &str) -> TracerouteResult {
        self.prober.traceroute(target, VISUAL_BOTTLENECK_THRESHOLD_MS).await
    }

    /// Body of a host's job: probe now, then once per interval until aborted.
    ///
    /// Ticks that fire while a probe is still running are skipped, so probes
    /// for one host never overlap.
    async fn run_job(self, host: Host, generation: u64, first_probe: oneshot::Sender<()>) {
        self.probe_once(&host, generation).await;
        let _ = first_probe.send(());

        let mut interval = tokio::time::interval(Duration::from_secs(host.interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            interval.tick().await;

            let max_jitter = self.config.probe_jitter.as_millis() as u64;
            if max_jitter > 0 {
                let jitter = rand::random::<u64>() % max_jitter;
                tokio::time::sleep(Duration::from_millis(jitter)).await;
            }

            self.probe_once(&host, generation).await;
        }
    }

    /// One probe cycle: ping, record, and trace the route when it looks bad.
    async fn probe_once(&self, host: &Host, generation: u64) {
        let result = self.prober.ping(host.id, &host.target).await;
        let timestamp = result.timestamp;
        let needs_traceroute = result.needs_traceroute();
        if let Some(error) = &result.error {
            tracing::debug!("Scheduler: probe of {} reported: {}", host.target, error);
        }

        let change = self.registry().apply_ping(host.id, generation, result);
        let Some(change) = change else {
            tracing::debug!("Scheduler: discarding result for cancelled job {} of {}", generation, host.alias);
            return;
        };

        if change.previous.is_offline() != change.host.status.is_offline() {
            let (title, body) = status_message(&change.host);
            self.notifier.notify(&title, &body);
        }
        self.persist();

        if !needs_traceroute {
            return;
        }

        let trace = self
            .prober
            .traceroute(&host.target, MONITOR_BOTTLENECK_THRESHOLD_MS)
            .await;
        if let Some(hop) = &trace.bottleneck {
            tracing::info!(
                "Scheduler: bottleneck for {} at hop {} ({}, {:.1} ms)",
                host.alias,
                hop.hop,
                hop.host,
                hop.time
            );
        }

        let attached = self
            .registry()
            .attach_traceroute(host.id, generation, timestamp, trace);
        if attached {
            self.persist();
        }
    }

    /// Ask the state writer to save. Requests made while one is pending
    /// are coalesced into it.
    fn persist(&self) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.persist_tx.try_send(()) {
            tracing::error!("Scheduler: state writer is gone, saving inline");
            self.writer.flush();
        }
    }
}

/// Saves registry snapshots through the persistence backend.
#[derive(Clone)]
struct StateWriter {
    registry: Arc<Mutex<Registry>>,
    persistence: Arc<dyn StatePersistence>,
    lock: Arc<Mutex<()>>,
}

impl StateWriter {
    /// Save the current state. Failures are logged, never propagated.
    ///
    /// Writes are serialized and each one snapshots the registry after taking
    /// the lock, so a later write never stores older state.
    fn flush(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot();
        if let Err(e) = self.persistence.save_state(&snapshot) {
            tracing::error!("Scheduler: failed to save state: {}", e);
        }
    }
}

/// Run the background writer that saves state off the probe tasks.
async fn run_state_writer(mut rx: mpsc::Receiver<()>, writer: StateWriter) {
    while rx.recv().await.is_some() {
        let writer = writer.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || writer.flush()).await {
            tracing::error!("Scheduler: state writer task failed: {}", e);
        }
    }
}
