//! Credentials for remote storage.

pub mod oauth;

pub use oauth::{OAuthConfig, OAuthService, TokenInfo};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Refresh when a token expires within this many seconds.
pub const REFRESH_SKEW_SECS: i64 = 5 * 60;

/// A bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        let token_type = if self.token_type.is_empty() {
            "Bearer"
        } else {
            &self.token_type
        };
        format!("{} {}", token_type, self.access_token)
    }

    /// Whether the token is expired or about to be at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Duration::seconds(REFRESH_SKEW_SECS) <= now,
            None => false,
        }
    }
}

/// Supplies a currently valid credential.
#[async_trait]
pub trait Auth: Send + Sync {
    async fn valid_credential(&self) -> Result<Credential>;
}
