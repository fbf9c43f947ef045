//! Notification channel definitions.

use serde::{Deserialize, Serialize};

/// Channel kinds with a built-in adapter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Discord,
    Slack,
    Chatwork,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Slack => "slack",
            Self::Chatwork => "chatwork",
            Self::Webhook => "webhook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discord" => Some(Self::Discord),
            "slack" => Some(Self::Slack),
            "chatwork" => Some(Self::Chatwork),
            "webhook" => Some(Self::Webhook),
            _ => None,
        }
    }
}

/// Opaque per-kind settings.
pub type ChannelSettings = serde_json::Map<String, serde_json::Value>;

/// A configured notification destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Unique channel name.
    pub name: String,
    pub kind: ChannelKind,
    /// Kind-specific settings, validated by the kind's factory.
    #[serde(default)]
    pub settings: ChannelSettings,
    #[serde(default = "super::default_true")]
    pub enabled: bool,
    #[serde(default = "super::default_true")]
    pub notify_on_success: bool,
    #[serde(default = "super::default_true")]
    pub notify_on_error: bool,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, kind: ChannelKind, settings: ChannelSettings) -> Self {
        Self {
            name: name.into(),
            kind,
            settings,
            enabled: true,
            notify_on_success: true,
            notify_on_error: true,
        }
    }

    /// Whether this channel wants the given outcome.
    pub fn wants(&self, success: bool) -> bool {
        self.enabled
            && if success {
                self.notify_on_success
            } else {
                self.notify_on_error
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wants_respects_flags() {
        let mut config = ChannelConfig::new("ops", ChannelKind::Slack, ChannelSettings::new());
        config.notify_on_success = false;
        assert!(!config.wants(true));
        assert!(config.wants(false));

        config.enabled = false;
        assert!(!config.wants(false));
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(ChannelKind::parse("chatwork"), Some(ChannelKind::Chatwork));
        assert_eq!(ChannelKind::Discord.to_string(), "discord");
        assert_eq!(ChannelKind::parse("email"), None);
    }
}
