//! Fire-and-forget notifications to approvers and requesters.
//!
//! Delivery failures never surface as errors; they are logged and reported
//! as a `false` return so the lifecycle can record `message_sent`.

use std::time::Duration;

use async_trait::async_trait;
use govern_common::config::NotifyConfig;
use serde::Serialize;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// Message category, forwarded as the `--type` of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    GovernanceRequest,
    GovernanceResponse,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GovernanceRequest => "governance_request",
            Self::GovernanceResponse => "governance_response",
        }
    }
}

/// A single outbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub kind: NotificationKind,
    pub message: String,
    pub request_id: String,
    pub priority: Priority,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message. Returns whether delivery succeeded.
    async fn send(&self, notification: &Notification) -> bool;
}

/// Delivers messages by running an external send command.
pub struct CommandNotifier {
    command: String,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(config.command.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn args(notification: &Notification) -> Vec<String> {
        vec![
            notification.to.clone(),
            notification.subject.clone(),
            notification.message.clone(),
            "--priority".into(),
            notification.priority.as_str().into(),
            "--type".into(),
            notification.kind.as_str().into(),
        ]
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn send(&self, notification: &Notification) -> bool {
        let child = Command::new(&self.command)
            .args(Self::args(notification))
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) if output.status.success() => {
                tracing::info!(to = %notification.to, request_id = %notification.request_id, "Notification sent");
                true
            }
            Ok(Ok(output)) => {
                tracing::warn!(
                    command = %self.command,
                    code = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Notification command failed"
                );
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(command = %self.command, error = %e, "Notification command could not run");
                false
            }
            Err(_) => {
                tracing::warn!(command = %self.command, timeout_secs = self.timeout.as_secs(), "Notification command timed out");
                false
            }
        }
    }
}

/// Notifier used when notifications are turned off.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, notification: &Notification) -> bool {
        tracing::debug!(to = %notification.to, "Notifications disabled, skipping");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notification {
        Notification {
            to: "manager".into(),
            subject: "[GOVERNANCE] spawn: worker".into(),
            kind: NotificationKind::GovernanceRequest,
            message: "GovernanceRequest submitted".into(),
            request_id: "GR-1".into(),
            priority: Priority::High,
        }
    }

    #[test]
    fn test_command_args() {
        let args = CommandNotifier::args(&sample());
        assert_eq!(
            args,
            vec![
                "manager",
                "[GOVERNANCE] spawn: worker",
                "GovernanceRequest submitted",
                "--priority",
                "high",
                "--type",
                "governance_request",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_command_reports_false() {
        let notifier = CommandNotifier::new(
            "definitely-not-a-real-send-command-7f3a",
            Duration::from_secs(5),
        );
        assert!(!notifier.send(&sample()).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides_result() {
        let ok = CommandNotifier::new("true", Duration::from_secs(5));
        assert!(ok.send(&sample()).await);

        let failing = CommandNotifier::new("false", Duration::from_secs(5));
        assert!(!failing.send(&sample()).await);
    }

    #[tokio::test]
    async fn test_disabled_notifier() {
        assert!(!DisabledNotifier.send(&sample()).await);
    }
}
