pub mod error;
pub mod telegram;

use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel_name(&self) -> &'static str;

    /// Delivers `text` to `destination`, or to the channel's default target when `None`.
    /// `Ok` means the transport confirmed delivery.
    async fn send(&self, text: &str, destination: Option<&str>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCommand {
    pub update_id: i64,
    pub chat_id: String,
    pub chat_title: Option<String>,
    pub text: String,
    pub sent_at: Option<DateTime<Utc>>,
}

/// One poll of the command stream. `max_update_id` covers every update seen, including ones
/// that carried no usable command, so the cursor can move past them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    pub max_update_id: Option<i64>,
    pub commands: Vec<IncomingCommand>,
}

#[async_trait::async_trait]
pub trait CommandFeed: Send + Sync {
    /// Updates with id strictly greater than `after`.
    async fn poll(&self, after: i64) -> anyhow::Result<CommandBatch>;
}

/// Stands in when no transport is configured. Every send fails, so nothing is recorded as
/// delivered and scheduled phases stay open.
#[derive(Debug, Clone)]
pub struct UnconfiguredChannel {
    pub reason: String,
}

#[async_trait::async_trait]
impl NotificationChannel for UnconfiguredChannel {
    fn channel_name(&self) -> &'static str {
        "unconfigured"
    }

    async fn send(&self, _text: &str, _destination: Option<&str>) -> anyhow::Result<()> {
        Err(error::NotifyError {
            channel: "unconfigured",
            stage: "config",
            detail: self.reason.clone(),
        }
        .into())
    }
}

/// Logs instead of sending; used for dry runs.
#[derive(Debug, Clone, Default)]
pub struct LogOnlyChannel;

#[async_trait::async_trait]
impl NotificationChannel for LogOnlyChannel {
    fn channel_name(&self) -> &'static str {
        "log_only"
    }

    async fn send(&self, text: &str, destination: Option<&str>) -> anyhow::Result<()> {
        tracing::info!(
            destination = destination.unwrap_or("default"),
            chars = text.chars().count(),
            "dry-run notification:\n{text}"
        );
        Ok(())
    }
}
