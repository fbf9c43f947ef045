//! Slack incoming-webhook notification channel.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{
    ChannelFactory, NotificationChannel, error_for_response, parse_settings, require_http_url,
};
use crate::domain::{ChannelKind, ChannelSettings};
use crate::notification::events::{Message, MessageKind, MessageStyle, NotificationEvent};
use crate::{Error, Result};

const FOOTER: &str = "Database Backup Service";

/// Slack channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Incoming webhook URL.
    #[serde(default)]
    pub webhook_url: String,
    /// Channel override, e.g. `#ops`.
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub icon_emoji: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl SlackConfig {
    pub fn validate(&self) -> Result<()> {
        require_http_url(ChannelKind::Slack, "webhook_url", &self.webhook_url)
    }
}

fn slack_link(url: &str) -> String {
    format!("<{url}|View File>")
}

const SLACK_STYLE: MessageStyle = MessageStyle {
    success_prefix: ":white_check_mark: ",
    failure_prefix: ":x: ",
    emphasis: "*",
    link: slack_link,
    ..MessageStyle::PLAIN
};

/// Slack notification channel.
pub struct SlackChannel {
    config: SlackConfig,
    client: Client,
}

impl SlackChannel {
    pub fn new(config: SlackConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn get_color(kind: MessageKind) -> &'static str {
        match kind {
            MessageKind::Success => "good",
            MessageKind::Error => "danger",
            MessageKind::Warning => "warning",
            MessageKind::Info => "#36a64f",
        }
    }

    fn build_payload(&self, message: &Message) -> serde_json::Value {
        let mut fields: Vec<serde_json::Value> = message
            .fields
            .iter()
            .map(|f| json!({ "title": f.name, "value": f.value, "short": true }))
            .collect();
        if !message.job_name.is_empty() {
            fields.push(
                json!({ "title": "Configuration", "value": message.job_name, "short": true }),
            );
        }

        let attachment = json!({
            "color": Self::get_color(message.kind),
            "title": message.title,
            "text": message.text,
            "fields": fields,
            "footer": FOOTER,
            "ts": message.timestamp.timestamp(),
        });

        let mut payload = json!({ "attachments": [attachment] });

        if let Some(channel) = &self.config.channel {
            payload["channel"] = json!(channel);
        }
        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        if let Some(icon_emoji) = &self.config.icon_emoji {
            payload["icon_emoji"] = json!(icon_emoji);
        }
        if let Some(icon_url) = &self.config.icon_url {
            payload["icon_url"] = json!(icon_url);
        }

        payload
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn validate_config(&self, settings: &ChannelSettings) -> Result<()> {
        parse_settings::<SlackConfig>(ChannelKind::Slack, settings)?.validate()
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let payload = self.build_payload(message);

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::delivery("slack", format!("request failed: {e}")))?;

        if let Err(e) = error_for_response(ChannelKind::Slack, response).await {
            warn!("Slack webhook failed: {}", e);
            return Err(e);
        }

        debug!("Slack notification sent: {}", message.title);
        Ok(())
    }
}

/// Factory for [`SlackChannel`].
pub struct SlackFactory {
    client: Client,
}

impl SlackFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ChannelFactory for SlackFactory {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn validate(&self, settings: &ChannelSettings) -> Result<()> {
        parse_settings::<SlackConfig>(ChannelKind::Slack, settings)?.validate()
    }

    fn build(&self, settings: &ChannelSettings) -> Result<Arc<dyn NotificationChannel>> {
        let config: SlackConfig = parse_settings(ChannelKind::Slack, settings)?;
        config.validate()?;
        Ok(Arc::new(SlackChannel::new(config, self.client.clone())))
    }

    fn render(&self, event: &NotificationEvent) -> Message {
        Message::for_event(event, &SLACK_STYLE)
    }
}
