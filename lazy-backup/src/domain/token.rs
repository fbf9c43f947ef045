//! Persisted OAuth tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens for one OAuth client, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Client the tokens were issued to; one row per client.
    pub client_id: String,
    /// Empty until the first refresh when seeded from a refresh token alone.
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Whether the access token is present and not yet expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}
