//! Discord webhook notification channel.
//!
//! Implements Discord's recommended rate limit handling:
//! - No hardcoded rate limits
//! - Retries on 429 responses respecting the Retry-After header

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{ChannelFactory, NotificationChannel, parse_settings, require_http_url};
use crate::domain::{ChannelKind, ChannelSettings};
use crate::notification::events::{Message, MessageKind, MessageStyle, NotificationEvent};
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

const FOOTER: &str = "Database Backup Service";

/// Discord channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Discord webhook URL.
    #[serde(default)]
    pub webhook_url: String,
    /// Optional username for the webhook.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional avatar URL for the webhook.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            username: Some("lazy-backup".to_string()),
            avatar_url: None,
        }
    }
}

impl DiscordConfig {
    pub fn validate(&self) -> Result<()> {
        require_http_url(ChannelKind::Discord, "webhook_url", &self.webhook_url)
    }
}

fn markdown_link(url: &str) -> String {
    format!("[View File]({url})")
}

const DISCORD_STYLE: MessageStyle = MessageStyle {
    success_prefix: "✅ ",
    failure_prefix: "❌ ",
    emphasis: "**",
    database_label: "🗄️ Database Type",
    file_name_label: "📁 File Name",
    file_size_label: "📊 File Size",
    duration_label: "⏱️ Duration",
    link_label: "🔗 Link",
    error_label: "❌ Error",
    link: markdown_link,
};

/// Discord notification channel.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    /// Create a new Discord channel.
    pub fn new(config: DiscordConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Get the embed color based on message kind.
    fn get_color(kind: MessageKind) -> u32 {
        match kind {
            MessageKind::Success => 0x00FF00, // Green
            MessageKind::Error => 0xFF0000,   // Red
            MessageKind::Warning => 0xFFFF00, // Yellow
            MessageKind::Info => 0x0099FF,    // Blue
        }
    }

    /// Build the webhook payload for a message.
    fn build_payload(&self, message: &Message) -> serde_json::Value {
        let mut fields: Vec<serde_json::Value> = message
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "value": f.value, "inline": true }))
            .collect();
        if !message.job_name.is_empty() {
            fields.push(
                json!({ "name": "Configuration", "value": message.job_name, "inline": true }),
            );
        }

        let embed = json!({
            "title": message.title,
            "description": message.text,
            "color": Self::get_color(message.kind),
            "timestamp": message.timestamp.to_rfc3339(),
            "fields": fields,
            "footer": { "text": FOOTER }
        });

        let mut payload = json!({
            "embeds": [embed]
        });

        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }

    /// Send request with rate limit handling.
    /// Retries on 429 responses respecting the Retry-After header.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&self.config.webhook_url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::delivery("discord", format!("request failed: {e}")))?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = Self::parse_retry_after(&response);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Discord rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::delivery(
                        "discord",
                        format!("rate limit exceeded after {MAX_RATE_LIMIT_RETRIES} retries"),
                    ));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            // Other error - don't retry
            let body = response.text().await.unwrap_or_default();
            warn!("Discord webhook failed: {} - {}", status, body);
            return Err(Error::delivery(
                "discord",
                format!("webhook returned {status}: {body}"),
            ));
        }
    }

    /// Parse the Retry-After duration from a 429 response.
    fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
        if let Some(retry_after) = response.headers().get("Retry-After")
            && let Ok(secs) = retry_after.to_str().ok()?.parse::<f64>()
        {
            return Some(Duration::from_secs_f64(secs));
        }

        if let Some(reset_after) = response.headers().get("X-RateLimit-Reset-After")
            && let Ok(secs) = reset_after.to_str().ok()?.parse::<f64>()
        {
            return Some(Duration::from_secs_f64(secs));
        }

        None
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    fn validate_config(&self, settings: &ChannelSettings) -> Result<()> {
        parse_settings::<DiscordConfig>(ChannelKind::Discord, settings)?.validate()
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let payload = self.build_payload(message);
        self.send_with_retry(&payload).await?;

        debug!("Discord notification sent: {}", message.title);
        Ok(())
    }
}

/// Factory for [`DiscordChannel`].
pub struct DiscordFactory {
    client: Client,
}

impl DiscordFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ChannelFactory for DiscordFactory {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    fn validate(&self, settings: &ChannelSettings) -> Result<()> {
        parse_settings::<DiscordConfig>(ChannelKind::Discord, settings)?.validate()
    }

    fn build(&self, settings: &ChannelSettings) -> Result<Arc<dyn NotificationChannel>> {
        let config: DiscordConfig = parse_settings(ChannelKind::Discord, settings)?;
        config.validate()?;
        Ok(Arc::new(DiscordChannel::new(config, self.client.clone())))
    }

    fn render(&self, event: &NotificationEvent) -> Message {
        Message::for_event(event, &DISCORD_STYLE)
    }
}
