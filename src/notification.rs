//! User-visible notices: cycle summaries and terminal job failures.

use crate::config::NotificationConfig;
#[cfg(feature = "notifications")]
use crate::constants::NOTIFICATION_TIMEOUT_MS;

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// New messages were stored by a sync
    SyncSummary { stored: usize },
    /// To-dos were pushed to the backend
    TodoSummary { synced: usize, list: String },
    /// A job failed and will not be retried this cycle
    Failure { job: String, message: String },
}

impl Notice {
    pub fn summary(&self) -> String {
        match self {
            Notice::SyncSummary { stored: 1 } => "1 new email".to_string(),
            Notice::SyncSummary { stored } => format!("{} new emails", stored),
            Notice::TodoSummary { synced: 1, .. } => "1 to-do added".to_string(),
            Notice::TodoSummary { synced, .. } => format!("{} to-dos added", synced),
            Notice::Failure { job, .. } => format!("mailflow: {} failed", job),
        }
    }

    pub fn body(&self) -> Option<String> {
        match self {
            Notice::SyncSummary { .. } => None,
            Notice::TodoSummary { list, .. } => Some(format!("List: {}", list)),
            Notice::Failure { message, .. } => Some(message.clone()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Notice::Failure { .. })
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Desktop notifications when available and enabled, the log otherwise.
pub struct DesktopNotifier {
    enabled: bool,
    show_summary: bool,
}

impl DesktopNotifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            show_summary: config.show_summary,
        }
    }

    /// Whether a notice gets shown at all. Failures always are.
    fn wants(&self, notice: &Notice) -> bool {
        notice.is_failure() || self.show_summary
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, notice: &Notice) {
        if !self.wants(notice) {
            return;
        }

        let summary = notice.summary();
        let body = notice.body();
        if self.enabled && show_desktop(&summary, body.as_deref()) {
            return;
        }

        match (notice.is_failure(), body) {
            (true, Some(body)) => tracing::error!("{}: {}", summary, body),
            (true, None) => tracing::error!("{}", summary),
            (false, Some(body)) => tracing::info!("{} ({})", summary, body),
            (false, None) => tracing::info!("{}", summary),
        }
    }
}

/// Returns false when nothing was shown.
#[cfg(feature = "notifications")]
fn show_desktop(summary: &str, body: Option<&str>) -> bool {
    // Fire and forget, don't block on errors
    match send_notification(summary, body) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to send desktop notification: {}", e);
            false
        }
    }
}

#[cfg(not(feature = "notifications"))]
fn show_desktop(_summary: &str, _body: Option<&str>) -> bool {
    false
}

/// Low-level notification sending
#[cfg(feature = "notifications")]
fn send_notification(summary: &str, body: Option<&str>) -> Result<(), notify_rust::error::Error> {
    use notify_rust::Notification;

    let mut notification = Notification::new();
    notification
        .summary(summary)
        .appname("mailflow")
        .timeout(notify_rust::Timeout::Milliseconds(NOTIFICATION_TIMEOUT_MS));

    if let Some(body) = body {
        notification.body(body);
    }

    notification.icon("mail-unread");

    notification.show()?;
    Ok(())
}
