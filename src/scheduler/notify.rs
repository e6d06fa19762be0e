//! Status-change notifications.

use crate::db::Host;

/// Receives online/offline transitions. Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Notifier that writes transitions to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::warn!("{}: {}", title, body);
    }
}

/// Title and body for a host that just went offline or came back.
pub(crate) fn status_message(host: &Host) -> (String, String) {
    if host.status.is_offline() {
        (
            "Host offline".to_string(),
            format!("{} ({}) is not responding", host.alias, host.target),
        )
    } else {
        (
            "Host online".to_string(),
            format!("{} ({}) is reachable again", host.alias, host.target),
        )
    }
}
