//! Ping command construction and output parsing.

use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

use super::runner::{CommandOutput, CommandSpec, ExitState};
use super::Platform;
use crate::db::{HostId, PingResult, Quality};

/// Echo requests sent per probe unless configured otherwise.
pub const DEFAULT_PING_COUNT: u32 = 4;

/// Build the ping invocation for `platform`.
pub fn ping_command(platform: Platform, target: &str, count: u32) -> CommandSpec {
    let count = count.to_string();
    match platform {
        Platform::Windows => CommandSpec::new("ping", ["-n", count.as_str(), target]),
        Platform::MacOs | Platform::Linux => CommandSpec::new("ping", ["-c", count.as_str(), target]),
    }
}

/// Extract every per-reply round-trip time, in order.
///
/// Accepts `time=12.3 ms`, `time<1ms` and `TIME=4ms` alike.
pub fn parse_ping_times(output: &str) -> Vec<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)time[=<]\s*(?P<val>\d+(?:\.\d+)?)").unwrap());

    output
        .lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.name("val")?.as_str().parse::<f64>().ok())
        .collect()
}

/// Turn captured ping output into a result.
///
/// The probe counts as successful only when the tool exited with status 0 and
/// wrote nothing to stderr. `count` is the number of echo requests that were
/// sent and drives the packet-loss figure.
pub fn parse_ping(host_id: HostId, target: &str, output: &CommandOutput, count: u32) -> PingResult {
    let transmitted = count.max(1);
    let stderr = output.stderr.trim();

    let failure = match output.state {
        ExitState::TimedOut(limit) => Some(format!("ping timed out after {:?}", limit)),
        ExitState::Exited(Some(0)) if stderr.is_empty() => None,
        ExitState::Exited(_) if !stderr.is_empty() => Some(stderr.to_string()),
        ExitState::Exited(Some(code)) => Some(format!("ping exited with status {}", code)),
        ExitState::Exited(None) => Some("ping was terminated by a signal".to_string()),
    };
    if let Some(error) = failure {
        return PingResult::failure(host_id, target, transmitted, error);
    }

    let times = parse_ping_times(&output.stdout);
    let mut result = PingResult {
        host_id,
        target: target.to_string(),
        timestamp: Utc::now(),
        success: true,
        times: Vec::new(),
        packets_transmitted: 0,
        packets_received: 0,
        packet_loss: 0.0,
        min_time: 0.0,
        avg_time: 0.0,
        max_time: 0.0,
        quality: Quality::Poor,
        indeterminate: false,
        error: None,
        traceroute: None,
    };

    if times.is_empty() {
        result.indeterminate = true;
        result.error = Some("no round-trip times found in ping output".to_string());
        return result;
    }

    let received = times.len() as u32;
    let sum: f64 = times.iter().sum();
    result.packets_transmitted = transmitted;
    result.packets_received = received;
    result.packet_loss = (transmitted.saturating_sub(received)) as f64 / transmitted as f64 * 100.0;
    result.avg_time = sum / times.len() as f64;
    result.min_time = times.iter().copied().fold(f64::INFINITY, f64::min);
    result.max_time = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    result.times = times;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const LINUX_OUTPUT: &str = r#"PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=10.2 ms
64 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time=12.0 ms
64 bytes from 8.8.8.8: icmp_seq=4 ttl=117 time=11.5 ms

--- 8.8.8.8 ping statistics ---
4 packets transmitted, 3 received, 25% packet loss, time 3004ms
rtt min/avg/max/mdev = 10.200/11.233/12.000/0.760 ms"#;

    const WINDOWS_OUTPUT: &str = "\r
Pinging 192.168.1.1 with 32 bytes of data:\r
Reply from 192.168.1.1: bytes=32 time<1ms TTL=64\r
Reply from 192.168.1.1: bytes=32 time=2ms TTL=64\r
Reply from 192.168.1.1: bytes=32 TIME=3ms TTL=64\r
Reply from 192.168.1.1: bytes=32 time=1ms TTL=64\r
";

    #[test]
    fn test_parse_linux_partial_loss() {
        let output = CommandOutput::exited(LINUX_OUTPUT, "", 0);
        let result = parse_ping(1, "8.8.8.8", &output, 4);

        assert!(result.success);
        assert_eq!(result.times, vec![10.2, 12.0, 11.5]);
        assert_eq!(result.packets_transmitted, 4);
        assert_eq!(result.packets_received, 3);
        assert_eq!(result.packet_loss, 25.0);
        assert!((result.avg_time - 11.2333).abs() < 0.001);
        assert_eq!(result.min_time, 10.2);
        assert_eq!(result.max_time, 12.0);
        assert!(!result.indeterminate);
    }

    #[test]
    fn test_parse_windows_separators() {
        let output = CommandOutput::exited(WINDOWS_OUTPUT, "", 0);
        let result = parse_ping(1, "192.168.1.1", &output, 4);

        assert_eq!(result.times, vec![1.0, 2.0, 3.0, 1.0]);
        assert_eq!(result.packet_loss, 0.0);
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let output = CommandOutput::exited("PING nowhere ...\n", "", 1);
        let result = parse_ping(1, "nowhere", &output, 4);

        assert!(!result.success);
        assert!(result.times.is_empty());
        assert_eq!(result.packet_loss, 100.0);
        assert_eq!(result.avg_time, 0.0);
        assert_eq!(result.error.as_deref(), Some("ping exited with status 1"));
    }

    #[test]
    fn test_stderr_is_failure_even_on_zero_exit() {
        let output = CommandOutput::exited(LINUX_OUTPUT, "ping: unknown host\n", 0);
        let result = parse_ping(1, "bad", &output, 4);

        assert!(!result.success);
        assert!(result.times.is_empty());
        assert_eq!(result.error.as_deref(), Some("ping: unknown host"));
    }

    #[test]
    fn test_timeout_is_failure() {
        let output = CommandOutput {
            stdout: "64 bytes from x: time=1 ms\n".to_string(),
            stderr: String::new(),
            state: ExitState::TimedOut(Duration::from_secs(5)),
        };
        let result = parse_ping(1, "x", &output, 4);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[test]
    fn test_clean_exit_without_samples_is_indeterminate() {
        let output = CommandOutput::exited("garbled locale output\n", "", 0);
        let result = parse_ping(1, "x", &output, 4);

        assert!(result.success);
        assert!(result.indeterminate);
        assert_eq!(result.packets_received, 0);
        assert_eq!(result.avg_time, 0.0);
        assert_eq!(result.packet_loss, 0.0);
    }

    #[test]
    fn test_platform_arguments() {
        let win = ping_command(Platform::Windows, "example.com", 4);
        assert_eq!(win.program, "ping");
        assert_eq!(win.args, vec!["-n", "4", "example.com"]);

        let mac = ping_command(Platform::MacOs, "example.com", 2);
        assert_eq!(mac.args, vec!["-c", "2", "example.com"]);

        let linux = ping_command(Platform::Linux, "example.com", 4);
        assert_eq!(linux.args, vec!["-c", "4", "example.com"]);
    }
}
