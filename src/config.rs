//! Configuration module for pynk.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the JSON API (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite state file (default: "pynk.db")
    pub db_path: String,
    /// Echo requests sent per ping probe (default: 4)
    pub ping_count: u32,
    /// Results retained per host (default: 1000)
    pub history_capacity: usize,
    /// Hard deadline for a traceroute run (default: 30s)
    pub traceroute_timeout: Duration,
    /// Optional hard deadline for a ping run; unset leaves it to the tool
    pub ping_timeout: Option<Duration>,
    /// Upper bound of the random delay before a scheduled probe (default: 100ms)
    pub probe_jitter: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "pynk.db".to_string(),
            ping_count: 4,
            history_capacity: 1000,
            traceroute_timeout: Duration::from_secs(30),
            ping_timeout: None,
            probe_jitter: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PYNK_HTTP_PORT`: HTTP port (default: 8080)
    /// - `PYNK_DB_PATH`: Database file path (default: "pynk.db")
    /// - `PYNK_PING_COUNT`: Echo requests per probe (default: 4)
    /// - `PYNK_HISTORY_CAPACITY`: Results kept per host (default: 1000)
    /// - `PYNK_TRACEROUTE_TIMEOUT_SECS`: Traceroute deadline (default: 30)
    /// - `PYNK_PING_TIMEOUT_SECS`: Ping deadline (default: none)
    /// - `PYNK_PROBE_JITTER_MS`: Max scheduling jitter (default: 100)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Some(port) = parse_var("PYNK_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Ok(db_path) = env::var("PYNK_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(count) = parse_var::<u32>("PYNK_PING_COUNT") {
            if count > 0 {
                cfg.ping_count = count;
            }
        }

        if let Some(capacity) = parse_var::<usize>("PYNK_HISTORY_CAPACITY") {
            if capacity > 0 {
                cfg.history_capacity = capacity;
            }
        }

        if let Some(secs) = parse_var::<u64>("PYNK_TRACEROUTE_TIMEOUT_SECS") {
            if secs > 0 {
                cfg.traceroute_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = parse_var::<u64>("PYNK_PING_TIMEOUT_SECS") {
            if secs > 0 {
                cfg.ping_timeout = Some(Duration::from_secs(secs));
            }
        }

        if let Some(ms) = parse_var("PYNK_PROBE_JITTER_MS") {
            cfg.probe_jitter = Duration::from_millis(ms);
        }

        cfg
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Config: ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "pynk.db");
        assert_eq!(cfg.ping_count, 4);
        assert_eq!(cfg.history_capacity, 1000);
        assert_eq!(cfg.traceroute_timeout, Duration::from_secs(30));
        assert!(cfg.ping_timeout.is_none());
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("PYNK_TEST_PARSE_VAR", "not-a-number");
        assert_eq!(parse_var::<u32>("PYNK_TEST_PARSE_VAR"), None);
        env::set_var("PYNK_TEST_PARSE_VAR", " 42 ");
        assert_eq!(parse_var::<u32>("PYNK_TEST_PARSE_VAR"), Some(42));
        env::remove_var("PYNK_TEST_PARSE_VAR");
    }
}
