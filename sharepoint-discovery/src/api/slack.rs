//! Slack notifications via `chat.postMessage`

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::ensure_success;
use crate::config::SlackConfig;
use crate::sync::ports::Notifier;

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    notify_channel: String,
    alert_channel: String,
}

impl SlackClient {
    /// `None` when no bot token is configured
    pub fn from_config(http: reqwest::Client, config: &SlackConfig, base_url: &str) -> Option<Self> {
        let token = config.bot_token.clone()?;
        Some(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            notify_channel: config.notify_channel.clone(),
            alert_channel: config.alert_channel.clone(),
        })
    }

    async fn post(&self, channel: &str, text: &str) -> Result<()> {
        if channel.is_empty() {
            log::debug!("No Slack channel configured, not sending: {}", text);
            return Ok(());
        }

        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await
            .context("Slack request failed")?;
        let response = ensure_success(response, "Slack chat.postMessage").await?;
        let body: PostMessageResponse = response.json().await.context("Invalid Slack response")?;

        if !body.ok {
            bail!(
                "Slack rejected the message: {}",
                body.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        log::debug!("Posted Slack message to {}", channel);
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackClient {
    async fn notify(&self, message: &str) -> Result<()> {
        self.post(&self.notify_channel, message).await
    }

    async fn alert(&self, message: &str) -> Result<()> {
        self.post(&self.alert_channel, message).await
    }
}
