//! Quality grading and bottleneck detection.

use crate::db::{Hop, PingResult, Quality};

/// Minimum latency jump for the on-demand traceroute view.
pub const VISUAL_BOTTLENECK_THRESHOLD_MS: f64 = 20.0;

/// Minimum latency jump when tracing a monitored host after a failed ping.
pub const MONITOR_BOTTLENECK_THRESHOLD_MS: f64 = 50.0;

/// Grade a ping result. Rules are checked in order, worst first.
pub fn classify_quality(result: &PingResult) -> Quality {
    if !result.success {
        return Quality::Poor;
    }
    // No latency was measured, so it cannot be graded above fair.
    if result.indeterminate {
        return Quality::Fair;
    }

    let (loss, avg) = (result.packet_loss, result.avg_time);
    if loss > 5.0 || avg > 200.0 {
        Quality::Poor
    } else if loss > 1.0 || avg > 100.0 {
        Quality::Fair
    } else if avg > 50.0 {
        Quality::Good
    } else {
        Quality::Excellent
    }
}

/// Find the hop with the largest latency increase over its predecessor.
///
/// The increase must exceed `threshold_ms`. On ties the earliest hop wins.
pub fn find_bottleneck(hops: &[Hop], threshold_ms: f64) -> Option<Hop> {
    let mut max_increase = 0.0;
    let mut bottleneck = None;

    for pair in hops.windows(2) {
        let increase = pair[1].time - pair[0].time;
        if increase > max_increase && increase > threshold_ms {
            max_increase = increase;
            bottleneck = Some(&pair[1]);
        }
    }

    bottleneck.cloned()
}
