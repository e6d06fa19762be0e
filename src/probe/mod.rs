//! Probe module for host monitoring.
//!
//! Runs the system `ping` and `traceroute` tools and turns their output into
//! typed results.

mod classify;
mod ping;
mod runner;
mod traceroute;

pub use classify::*;
pub use ping::*;
pub use runner::*;
pub use traceroute::*;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::db::{HostId, PingResult, TracerouteResult};

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operating system family, which decides command names and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this binary was built for. Anything that is neither
    /// Windows nor macOS gets the Linux flags.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Probe settings.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub platform: Platform,
    pub ping_count: u32,
    pub ping_timeout: Option<Duration>,
    pub traceroute_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            ping_count: DEFAULT_PING_COUNT,
            ping_timeout: None,
            traceroute_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ServerConfig> for ProbeConfig {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            platform: Platform::current(),
            ping_count: cfg.ping_count,
            ping_timeout: cfg.ping_timeout,
            traceroute_timeout: cfg.traceroute_timeout,
        }
    }
}

/// Runs probes and always hands back a well-formed result.
#[derive(Clone)]
pub struct Prober {
    runner: Arc<dyn CommandRunner>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ProbeConfig) -> Self {
        Self { runner, config }
    }

    /// A prober backed by real child processes.
    pub fn system(config: ProbeConfig) -> Self {
        Self::new(Arc::new(SystemRunner), config)
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Ping `target` and grade the result.
    ///
    /// Launch and I/O failures come back as failed results, never as errors.
    pub async fn ping(&self, host_id: HostId, target: &str) -> PingResult {
        let cmd = ping_command(self.config.platform, target, self.config.ping_count);
        tracing::debug!("Prober: running `{}`", cmd);

        let mut result = match self.runner.run(&cmd, self.config.ping_timeout).await {
            Ok(output) => parse_ping(host_id, target, &output, self.config.ping_count),
            Err(e) => {
                tracing::error!("Prober: ping to {} failed: {}", target, e);
                PingResult::failure(host_id, target, self.config.ping_count, e.to_string())
            }
        };
        result.quality = classify_quality(&result);
        result
    }

    /// Traceroute `target`, flagging the hop whose latency jump exceeds
    /// `bottleneck_threshold_ms`.
    pub async fn traceroute(&self, target: &str, bottleneck_threshold_ms: f64) -> TracerouteResult {
        let cmd = traceroute_command(self.config.platform, target);
        tracing::info!("Prober: running `{}`", cmd);

        let (success, output, error) =
            match self.runner.run(&cmd, Some(self.config.traceroute_timeout)).await {
                Ok(out) => match out.state {
                    ExitState::TimedOut(limit) => {
                        (false, out.stdout, Some(ProbeError::Timeout(limit).to_string()))
                    }
                    ExitState::Exited(code) => {
                        let stderr = out.stderr.trim();
                        let error = if stderr.is_empty() { None } else { Some(stderr.to_string()) };
                        (code == Some(0), out.stdout, error)
                    }
                },
                Err(e) => {
                    tracing::error!("Prober: traceroute to {} failed: {}", target, e);
                    (false, String::new(), Some(e.to_string()))
                }
            };

        let hops = parse_traceroute(&output);
        let bottleneck = find_bottleneck(&hops, bottleneck_threshold_ms);

        TracerouteResult {
            target: target.to_string(),
            timestamp: Utc::now(),
            success,
            output,
            error,
            hops,
            bottleneck,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner used by prober and scheduler tests.

    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Script = dyn Fn(&CommandSpec) -> Result<CommandOutput, ProbeError> + Send + Sync;

    pub struct ScriptedRunner {
        script: Box<Script>,
        delay: Mutex<Duration>,
        pub pings: AtomicUsize,
        pub traceroutes: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl ScriptedRunner {
        pub fn new<F>(script: F) -> Self
        where
            F: Fn(&CommandSpec) -> Result<CommandOutput, ProbeError> + Send + Sync + 'static,
        {
            Self {
                script: Box::new(script),
                delay: Mutex::new(Duration::ZERO),
                pings: AtomicUsize::new(0),
                traceroutes: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        /// Every ping answers with `time=<ms>` four times; traceroutes
        /// report a two-hop path.
        pub fn healthy(ms: f64) -> Self {
            Self::new(move |cmd| {
                let target = cmd.args.last().cloned().unwrap_or_default();
                if cmd.program != "ping" {
                    let out = format!("traceroute to {0}\n 1  10.0.0.1  1 ms\n 2  {0}  {1} ms\n", target, ms);
                    return Ok(CommandOutput::exited(&out, "", 0));
                }
                let line = format!("64 bytes from {}: icmp_seq=1 ttl=64 time={} ms\n", target, ms);
                Ok(CommandOutput::exited(&format!("PING {}\n{}", target, line.repeat(4)), "", 0))
            })
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = delay;
        }

        pub fn ping_count(&self) -> usize {
            self.pings.load(Ordering::SeqCst)
        }

        pub fn traceroute_count(&self) -> usize {
            self.traceroutes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, cmd: &CommandSpec, _deadline: Option<Duration>) -> Result<CommandOutput, ProbeError> {
            if cmd.program == "ping" {
                self.pings.fetch_add(1, Ordering::SeqCst);
            } else {
                self.traceroutes.fetch_add(1, Ordering::SeqCst);
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.script)(cmd)
        }
    }
}
