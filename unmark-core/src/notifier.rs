//! Best-effort user notifications.
//!
//! Notifications never fail from the caller's point of view: backends log
//! their own errors and return.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub const DEFAULT_TITLE: &str = "Watermark Remover";
pub const DEFAULT_SUMMARY_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub subtitle: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            subtitle: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)?;
        if let Some(subtitle) = &self.subtitle {
            write!(f, " ({subtitle})")?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Which backend delivers notifications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierBackend {
    /// Desktop notifications on macOS, log lines elsewhere.
    #[default]
    Auto,
    Osascript,
    Log,
    Disabled,
}

/// Writes notifications to the log only.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) {
        info!(target: "unmark::notify", "{notification}");
    }
}

/// Swallows everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) {}
}

/// macOS desktop notifications through `osascript`.
#[derive(Clone, Debug)]
pub struct OsascriptNotifier {
    timeout: Duration,
}

impl Default for OsascriptNotifier {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl Notifier for OsascriptNotifier {
    async fn notify(&self, notification: &Notification) {
        let script = display_notification_script(notification);
        let run = Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .kill_on_drop(true)
            .output();

        match timeout(self.timeout, run).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!(%notification, "notification sent");
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    status = %output.status,
                    stderr = %stderr.trim(),
                    "notification failed"
                );
            }
            Ok(Err(err)) => error!(error = %err, "failed to send notification"),
            Err(_) => warn!(timeout = ?self.timeout, "notification timed out"),
        }
    }
}

/// Build a notifier for the configured backend.
pub fn notifier_for(backend: NotifierBackend) -> Arc<dyn Notifier> {
    match backend {
        NotifierBackend::Auto if cfg!(target_os = "macos") => Arc::new(OsascriptNotifier::default()),
        NotifierBackend::Auto | NotifierBackend::Log => Arc::new(LogNotifier),
        NotifierBackend::Osascript => Arc::new(OsascriptNotifier::default()),
        NotifierBackend::Disabled => Arc::new(NoopNotifier),
    }
}

/// AppleScript source for `display notification`.
pub fn display_notification_script(notification: &Notification) -> String {
    let mut script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape_applescript(&notification.message),
        escape_applescript(&notification.title)
    );
    if let Some(subtitle) = notification.subtitle.as_deref().filter(|s| !s.is_empty()) {
        script.push_str(&format!(" subtitle \"{}\"", escape_applescript(subtitle)));
    }
    script
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Shorten `text` to at most `limit` characters, on a character boundary.
pub fn truncate_summary(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
