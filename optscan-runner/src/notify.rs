//! Alert delivery for the loop monitor.

use crate::config::SlackCredentials;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn send(&self, subject: &str, text: &str) -> Result<(), NotifyError>;
}

/// Message body sent to chat sinks: a blank line, the subject, a blank
/// line, the text.
pub fn format_message(subject: &str, text: &str) -> String {
    format!("\n{subject}\n\n{text}")
}

// ─── Slack ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: String,
    channel: String,
}

impl SlackNotifier {
    pub fn new(credentials: &SlackCredentials) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            endpoint: "https://slack.com/api/".into(),
            token: credentials.bot_token.clone(),
            channel: credentials.channel.clone(),
        }
    }

    /// Point at a different API root (must end with `/`).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn parse_response(body: &str) -> Result<(), NotifyError> {
        let resp: SlackResponse = serde_json::from_str(body)
            .map_err(|e| NotifyError::Transport(format!("unreadable Slack response: {e}")))?;
        if resp.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected(
                resp.error.unwrap_or_else(|| "unknown error".into()),
            ))
        }
    }
}

impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    fn send(&self, subject: &str, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}chat.postMessage", self.endpoint);
        let body = serde_json::json!({
            "channel": self.channel,
            "text": format_message(subject, text),
        });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(NotifyError::Transport(format!("HTTP {status}")));
        }
        Self::parse_response(&text)
    }
}

// ─── Log only ────────────────────────────────────────────────────────

/// Writes alerts to the tracing log. Used when no chat sink is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, subject: &str, text: &str) -> Result<(), NotifyError> {
        tracing::warn!(subject, "{text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_layout() {
        assert_eq!(
            format_message("ALERT: AAA High Score", "details"),
            "\nALERT: AAA High Score\n\ndetails"
        );
    }

    #[test]
    fn slack_ok_and_error_bodies() {
        assert!(SlackNotifier::parse_response(r#"{"ok":true,"ts":"1.2"}"#).is_ok());
        let err = SlackNotifier::parse_response(r#"{"ok":false,"error":"channel_not_found"}"#)
            .unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(ref e) if e == "channel_not_found"));
        assert!(matches!(
            SlackNotifier::parse_response("<html>"),
            Err(NotifyError::Transport(_))
        ));
    }

    #[test]
    fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send("subject", "text").is_ok());
        assert_eq!(LogNotifier.name(), "log");
    }
}
