//! Notification channels.
//!
//! This module provides the adapters that deliver a rendered [`Message`]:
//! - Discord webhooks (embeds)
//! - Slack incoming webhooks (attachments)
//! - Chatwork rooms (REST API)
//! - Generic webhooks (HTTP POST/PUT of JSON)
//!
//! Each kind is registered in a [`ChannelRegistry`] as a [`ChannelFactory`]
//! which validates stored settings, builds the adapter and renders events.

mod chatwork;
mod discord;
mod slack;
mod webhook;

pub use chatwork::{ChatworkChannel, ChatworkConfig, ChatworkFactory};
pub use discord::{DiscordChannel, DiscordConfig, DiscordFactory};
pub use slack::{SlackChannel, SlackConfig, SlackFactory};
pub use webhook::{WebhookAuth, WebhookChannel, WebhookConfig, WebhookFactory};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use super::events::{Message, MessageStyle, NotificationEvent};
use crate::domain::{ChannelKind, ChannelSettings};
use crate::{Error, Result};

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// The channel kind.
    fn kind(&self) -> ChannelKind;

    /// Validate raw settings for this kind.
    fn validate_config(&self, settings: &ChannelSettings) -> Result<()>;

    /// Deliver one message.
    async fn send(&self, message: &Message) -> Result<()>;
}

/// Builds channels of one kind from stored settings.
pub trait ChannelFactory: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Validate settings without building a channel.
    fn validate(&self, settings: &ChannelSettings) -> Result<()>;

    /// Build a channel. Implementations validate first.
    fn build(&self, settings: &ChannelSettings) -> Result<Arc<dyn NotificationChannel>>;

    /// Render an event for this kind.
    fn render(&self, event: &NotificationEvent) -> Message {
        Message::for_event(event, &MessageStyle::PLAIN)
    }
}

/// Registry of channel factories keyed by kind.
#[derive(Default)]
pub struct ChannelRegistry {
    factories: RwLock<HashMap<ChannelKind, Arc<dyn ChannelFactory>>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in kinds, sharing one HTTP client.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(DiscordFactory::new(client.clone())));
        registry.register(Arc::new(SlackFactory::new(client.clone())));
        registry.register(Arc::new(ChatworkFactory::new(client.clone())));
        registry.register(Arc::new(WebhookFactory::new(client)));
        registry
    }

    /// Register a factory, returning the one it replaced.
    pub fn register(&self, factory: Arc<dyn ChannelFactory>) -> Option<Arc<dyn ChannelFactory>> {
        self.factories.write().insert(factory.kind(), factory)
    }

    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelFactory>> {
        self.factories.read().get(&kind).cloned()
    }

    /// Look up a factory, failing with a validation error for unknown kinds.
    pub fn factory(&self, kind: ChannelKind) -> Result<Arc<dyn ChannelFactory>> {
        self.get(kind).ok_or_else(|| {
            Error::validation(format!("no adapter registered for channel kind {kind}"))
        })
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<_> = self.factories.read().keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

/// Deserialize opaque settings into a typed config.
pub(crate) fn parse_settings<T: DeserializeOwned>(
    kind: ChannelKind,
    settings: &ChannelSettings,
) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(settings.clone()))
        .map_err(|e| Error::validation(format!("invalid {kind} settings: {e}")))
}

/// Require a non-empty string setting.
pub(crate) fn require_field(kind: ChannelKind, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} is required for {kind}")));
    }
    Ok(())
}

/// Require an absolute http(s) URL.
pub(crate) fn require_http_url(kind: ChannelKind, field: &str, value: &str) -> Result<()> {
    require_field(kind, field, value)?;
    let url = url::Url::parse(value)
        .map_err(|e| Error::validation(format!("{field} for {kind} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::validation(format!(
            "{field} for {kind} must use http or https, got {other}"
        ))),
    }
}

/// Turn a non-success HTTP response into a delivery error.
pub(crate) async fn error_for_response(
    kind: ChannelKind,
    response: reqwest::Response,
) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::delivery(
        kind.as_str(),
        format!("{kind} returned {status}: {body}"),
    ))
}
