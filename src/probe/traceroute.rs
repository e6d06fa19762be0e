//! Traceroute command construction and hop parsing.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use super::runner::CommandSpec;
use super::Platform;
use crate::db::Hop;

/// Maximum hop count passed to the tool.
pub const MAX_HOPS: u32 = 30;

/// Label for a hop where every probe timed out.
pub const NO_RESPONSE: &str = "No response";

/// Label for a hop whose line named no host at all.
pub const UNKNOWN_HOST: &str = "*";

/// Build the traceroute invocation for `platform`.
pub fn traceroute_command(platform: Platform, target: &str) -> CommandSpec {
    let hops = MAX_HOPS.to_string();
    match platform {
        Platform::Windows => CommandSpec::new("tracert", ["-d", "-h", hops.as_str(), target]),
        Platform::MacOs => CommandSpec::new("traceroute", ["-m", hops.as_str(), target]),
        Platform::Linux => CommandSpec::new("traceroute", ["-m", hops.as_str(), "-n", target]),
    }
}

struct Patterns {
    index: Regex,
    latency: Regex,
    ipv4: Regex,
    hostname: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        index: Regex::new(r"^(\d+)").unwrap(),
        latency: Regex::new(r"(\d+(?:\.\d*)?)\s*ms").unwrap(),
        ipv4: Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap(),
        // The last label must start with a letter so "1.234" is not a host.
        hostname: Regex::new(
            r"\b[a-zA-Z0-9][-a-zA-Z0-9]*(?:\.[a-zA-Z0-9][-a-zA-Z0-9]*)*\.[a-zA-Z][-a-zA-Z0-9]*\b",
        )
        .unwrap(),
    })
}

/// Parse one hop line. Returns `None` for lines without a positive hop index.
fn parse_hop_line(line: &str) -> Option<Hop> {
    let p = patterns();

    let hop: u32 = p.index.captures(line)?.get(1)?.as_str().parse().ok()?;
    if hop == 0 {
        return None;
    }

    let samples: Vec<f64> = p
        .latency
        .captures_iter(line)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect();
    let mut time = if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    };

    let ip = p.ipv4.find(line).map(|m| m.as_str());
    let name = p.hostname.find(line).map(|m| m.as_str());

    let host = match (ip, name) {
        (Some(ip), Some(name)) if name != ip => format!("{} ({})", name, ip),
        (Some(ip), _) => ip.to_string(),
        (None, Some(name)) => name.to_string(),
        (None, None) if line.contains('*') => {
            time = 0.0;
            NO_RESPONSE.to_string()
        }
        (None, None) => UNKNOWN_HOST.to_string(),
    };

    Some(Hop { hop, host, time })
}

/// Parse raw traceroute output into hops ordered by index.
///
/// The first line is treated as the banner. When several lines report the
/// same hop index the last one wins. Missing hops are left out, not filled in.
pub fn parse_traceroute(output: &str) -> Vec<Hop> {
    let mut hops: BTreeMap<u32, Hop> = BTreeMap::new();

    for line in output.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(hop) = parse_hop_line(line) {
            hops.insert(hop.hop, hop);
        }
    }

    hops.into_values().collect()
}

/// Render hops in a canonical text form that parses back to the same hops.
pub fn render_hops(target: &str, hops: &[Hop]) -> String {
    let mut out = format!("traceroute to {}, {} hops max\n", target, MAX_HOPS);
    for hop in hops {
        let _ = match hop.host.as_str() {
            NO_RESPONSE => writeln!(out, "{:>2}  * * *", hop.hop),
            UNKNOWN_HOST => writeln!(out, "{:>2}  {} ms", hop.hop, hop.time),
            host => writeln!(out, "{:>2}  {}  {} ms", hop.hop, host, hop.time),
        };
    }
    out
}
