use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use mayday_core::creds;

/// Failure to deliver a notification. Logged by the caller, never escalated.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// `SLACK_BOT_TOKEN` absent from the environment.
    #[error("slack bot token missing from environment")]
    TokenMissing,
    /// Transport-level failure talking to the Slack API.
    #[error("slack transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Slack accepted the request but rejected the message.
    #[error("slack api error: {0}")]
    Api(String),
}

/// Best-effort delivery of result text to a messaging channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `channel`.
    async fn send(&self, channel: &str, text: &str) -> Result<(), NotifyError>;
}

/// Slack `chat.postMessage` implementation.
pub struct SlackNotifier {
    http: reqwest::Client,
    endpoint: String,
}

const SLACK_POST_MESSAGE: &str = "https://slack.com/api/chat.postMessage";

impl SlackNotifier {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, endpoint: SLACK_POST_MESSAGE.to_string() }
    }

    #[cfg(test)]
    fn with_endpoint(http: reqwest::Client, endpoint: String) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        // The token is re-read per delivery so a rotated secret is picked up
        // without a restart.
        let token = creds::slack().bot_token.ok_or(NotifyError::TokenMissing)?;

        let resp = self
            .http
            .post(self.endpoint.as_str())
            .bearer_auth(token)
            .json(&serde_json::json!({ "channel": channel, "text": text }))
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = resp.json().await?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let detail =
                body.get("error").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            return Err(NotifyError::Api(detail));
        }
        debug!(%channel, "notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes the tests that touch SLACK_BOT_TOKEN.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn missing_token_is_reported() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("SLACK_BOT_TOKEN");
        let n = SlackNotifier::new(reqwest::Client::new());
        let err = n.send("#ops", "hi").await.unwrap_err();
        assert!(matches!(err, NotifyError::TokenMissing));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SLACK_BOT_TOKEN", "xoxb-test");
        let n = SlackNotifier::with_endpoint(
            reqwest::Client::new(),
            // Reserved port, nothing listens here.
            "http://127.0.0.1:1/api/chat.postMessage".to_string(),
        );
        let err = n.send("#ops", "hi").await.unwrap_err();
        std::env::remove_var("SLACK_BOT_TOKEN");
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
