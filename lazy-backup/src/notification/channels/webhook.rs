//! Generic webhook notification channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{
    ChannelFactory, NotificationChannel, error_for_response, parse_settings, require_http_url,
};
use crate::domain::{ChannelKind, ChannelSettings};
use crate::notification::events::Message;
use crate::{Error, Result};

/// Webhook channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL.
    #[serde(default)]
    pub url: String,
    /// HTTP method (default: POST).
    #[serde(default = "default_method")]
    pub method: String,
    /// Custom headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Authentication type.
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookAuth {
    /// Bearer token authentication.
    Bearer { token: String },
    /// Basic authentication.
    Basic { username: String, password: String },
    /// Custom header authentication.
    Header { name: String, value: String },
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_method(),
            headers: Vec::new(),
            auth: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<()> {
        require_http_url(ChannelKind::Webhook, "url", &self.url)?;
        match self.method.to_uppercase().as_str() {
            "POST" | "PUT" => Ok(()),
            other => Err(Error::validation(format!(
                "webhook method must be POST or PUT, got {other}"
            ))),
        }
    }
}

/// Generic webhook notification channel.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new Webhook channel.
    pub fn new(config: WebhookConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Build the request headers.
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }

        if let Some(auth) = &self.config.auth {
            match auth {
                WebhookAuth::Bearer { token } => {
                    if let Ok(value) = format!("Bearer {}", token).parse() {
                        headers.insert(reqwest::header::AUTHORIZATION, value);
                    }
                }
                WebhookAuth::Header { name, value } => {
                    if let (Ok(name), Ok(value)) = (
                        name.parse::<reqwest::header::HeaderName>(),
                        value.parse::<reqwest::header::HeaderValue>(),
                    ) {
                        headers.insert(name, value);
                    }
                }
                WebhookAuth::Basic { .. } => {
                    // Basic auth is handled separately in the request builder
                }
            }
        }

        headers
    }

    /// Build the JSON payload.
    fn build_payload(&self, message: &Message) -> serde_json::Value {
        json!({
            "type": message.kind.to_string(),
            "title": message.title,
            "text": message.text,
            "fields": message.fields,
            "timestamp": message.timestamp.to_rfc3339(),
            "config_name": message.job_name,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn validate_config(&self, settings: &ChannelSettings) -> Result<()> {
        parse_settings::<WebhookConfig>(ChannelKind::Webhook, settings)?.validate()
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let payload = self.build_payload(message);
        let headers = self.build_headers();

        let mut request = match self.config.method.to_uppercase().as_str() {
            "PUT" => self.client.put(&self.config.url),
            _ => self.client.post(&self.config.url),
        };

        request = request.headers(headers).json(&payload);
        if self.config.timeout_secs > 0 {
            request = request.timeout(Duration::from_secs(self.config.timeout_secs));
        }

        if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::delivery("webhook", format!("request failed: {e}")))?;

        if let Err(e) = error_for_response(ChannelKind::Webhook, response).await {
            warn!("Webhook failed: {}", e);
            return Err(e);
        }

        debug!("Webhook notification sent: {}", message.title);
        Ok(())
    }
}

/// Factory for [`WebhookChannel`].
pub struct WebhookFactory {
    client: Client,
}

impl WebhookFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ChannelFactory for WebhookFactory {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn validate(&self, settings: &ChannelSettings) -> Result<()> {
        parse_settings::<WebhookConfig>(ChannelKind::Webhook, settings)?.validate()
    }

    fn build(&self, settings: &ChannelSettings) -> Result<Arc<dyn NotificationChannel>> {
        let config: WebhookConfig = parse_settings(ChannelKind::Webhook, settings)?;
        config.validate()?;
        Ok(Arc::new(WebhookChannel::new(config, self.client.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::test_client;
    use serde_json::json;

    #[test]
    fn test_webhook_config_default() {
        let config = WebhookConfig::default();
        assert!(config.url.is_empty());
        assert_eq!(config.method, "POST");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_method_rejected() {
        let config = WebhookConfig {
            url: "https://example.com/hook".to_string(),
            method: "DELETE".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_build_headers_with_bearer() {
        let config = WebhookConfig {
            url: "https://example.com/hook".to_string(),
            headers: vec![("X-Env".to_string(), "prod".to_string())],
            auth: Some(WebhookAuth::Bearer {
                token: "secret".to_string(),
            }),
            ..Default::default()
        };
        let channel = WebhookChannel::new(config, test_client());
        let headers = channel.build_headers();
        assert_eq!(headers["X-Env"], "prod");
        assert_eq!(headers[reqwest::header::AUTHORIZATION], "Bearer secret");
    }

    #[test]
    fn test_settings_with_tagged_auth() {
        let settings = json!({
            "url": "https://example.com/hook",
            "auth": { "type": "Header", "name": "X-Key", "value": "k" }
        })
        .as_object()
        .cloned()
        .unwrap();
        let config: WebhookConfig = parse_settings(ChannelKind::Webhook, &settings).unwrap();
        assert!(matches!(config.auth, Some(WebhookAuth::Header { .. })));
        assert!(WebhookFactory::new(test_client()).validate(&settings).is_ok());
    }

    #[test]
    fn test_payload_contains_fields() {
        let channel = WebhookChannel::new(WebhookConfig::default(), test_client());
        let payload = channel.build_payload(&Message::test("hook", ChannelKind::Webhook));
        assert_eq!(payload["type"], "info");
        assert_eq!(payload["config_name"], "hook");
        assert!(payload["fields"].as_array().unwrap().is_empty());
    }
}
