use crate::error::{NotifyError, Result};
use crate::{NotificationChannel, TrackingSnapshot};
use async_trait::async_trait;

/// Longest response body kept in an [`NotifyError::ApiError`].
const MAX_ERROR_BODY: usize = 512;

/// Posts Slack-compatible `{"text": ...}` payloads to an incoming webhook.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn post(&self, text: String) -> Result<()> {
        let body = serde_json::json!({ "text": text });
        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = match resp.text().await {
            Ok(text) => truncate(&text, MAX_ERROR_BODY),
            Err(e) => format!("[failed to read response body: {e}]"),
        };
        Err(NotifyError::ApiError {
            service: "webhook".to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send_status(&self, snapshot: &TrackingSnapshot) -> Result<()> {
        self.post(snapshot.status_message()).await
    }

    async fn send_expiry(&self, snapshot: &TrackingSnapshot) -> Result<()> {
        self.post(snapshot.expiry_message()).await
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}
