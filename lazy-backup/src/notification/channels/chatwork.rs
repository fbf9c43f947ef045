//! Chatwork room notification channel.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    ChannelFactory, NotificationChannel, error_for_response, parse_settings, require_field,
    require_http_url,
};
use crate::domain::{ChannelKind, ChannelSettings};
use crate::notification::events::{Message, MessageKind};
use crate::{Error, Result};

const DEFAULT_API_BASE: &str = "https://api.chatwork.com/v2";
const TOKEN_HEADER: &str = "X-ChatWorkToken";

/// Chatwork channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatworkConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub room_id: String,
    /// API root, overridable for self-hosted proxies.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Default for ChatworkConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            room_id: String::new(),
            api_base: default_api_base(),
        }
    }
}

impl ChatworkConfig {
    pub fn validate(&self) -> Result<()> {
        require_field(ChannelKind::Chatwork, "api_token", &self.api_token)?;
        require_field(ChannelKind::Chatwork, "room_id", &self.room_id)?;
        require_http_url(ChannelKind::Chatwork, "api_base", &self.api_base)
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/rooms/{}/messages",
            self.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.room_id)
        )
    }
}

/// Chatwork notification channel.
pub struct ChatworkChannel {
    config: ChatworkConfig,
    client: Client,
}

impl ChatworkChannel {
    pub fn new(config: ChatworkConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn emoji(kind: MessageKind) -> &'static str {
        match kind {
            MessageKind::Success => "✅",
            MessageKind::Error => "❌",
            MessageKind::Warning => "⚠️",
            MessageKind::Info => "ℹ️",
        }
    }

    /// Render the message body using Chatwork's `[info]` markup.
    fn format_body(message: &Message) -> String {
        let mut body = String::new();
        let _ = writeln!(
            body,
            "[info][title]{} {}[/title]",
            Self::emoji(message.kind),
            message.title
        );
        let _ = writeln!(
            body,
            "⏰ Time: {}",
            message.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        body.push_str("[hr]\n");

        if !message.text.is_empty() {
            let _ = writeln!(body, "📝 {}", message.text);
        }

        if !message.fields.is_empty() {
            body.push_str("\n📌 Details:\n");
            for field in &message.fields {
                let _ = writeln!(body, "• {}: {}", field.name, field.value);
            }
        }
        body.push_str("[hr]\n");

        if !message.job_name.is_empty() {
            let _ = writeln!(body, "⚙️ Config: {}", message.job_name);
        }
        body.push_str("[/info]");
        body
    }
}

#[async_trait]
impl NotificationChannel for ChatworkChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chatwork
    }

    fn validate_config(&self, settings: &ChannelSettings) -> Result<()> {
        parse_settings::<ChatworkConfig>(ChannelKind::Chatwork, settings)?.validate()
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let body = Self::format_body(message);

        let response = self
            .client
            .post(self.config.messages_url())
            .header(TOKEN_HEADER, &self.config.api_token)
            .form(&[("body", body.as_str()), ("self_unread", "0")])
            .send()
            .await
            .map_err(|e| Error::delivery("chatwork", format!("request failed: {e}")))?;

        if let Err(e) = error_for_response(ChannelKind::Chatwork, response).await {
            warn!(room_id = %self.config.room_id, "Chatwork message failed: {}", e);
            return Err(e);
        }

        debug!(room_id = %self.config.room_id, "Chatwork notification sent");
        Ok(())
    }
}

/// Factory for [`ChatworkChannel`]. Uses the plain message layout.
pub struct ChatworkFactory {
    client: Client,
}

impl ChatworkFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ChannelFactory for ChatworkFactory {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chatwork
    }

    fn validate(&self, settings: &ChannelSettings) -> Result<()> {
        parse_settings::<ChatworkConfig>(ChannelKind::Chatwork, settings)?.validate()
    }

    fn build(&self, settings: &ChannelSettings) -> Result<Arc<dyn NotificationChannel>> {
        let config: ChatworkConfig = parse_settings(ChannelKind::Chatwork, settings)?;
        config.validate()?;
        Ok(Arc::new(ChatworkChannel::new(config, self.client.clone())))
    }
}
