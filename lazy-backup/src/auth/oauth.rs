//! OAuth 2.0 authorization for Google Drive.
//!
//! Tokens are persisted in the [`ConfigStore`], one row per client id. They are
//! obtained either through the consent flow ([`OAuthService::auth_url`] then
//! [`OAuthService::exchange_code`]) or seeded from a configured refresh token.
//! Access tokens are refreshed shortly before they expire and written back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{Auth, Credential};
use crate::database::ConfigStore;
use crate::domain::OAuthToken;
use crate::{Error, Result};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_ABOUT_URL: &str = "https://www.googleapis.com/drive/v3/about";
/// Access limited to files the application creates.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// OAuth client settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Required for the consent flow only.
    pub redirect_url: Option<String>,
    /// Seeds the store when no token row exists yet.
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    /// Endpoint used to check a token against the API.
    pub about_url: String,
}

impl OAuthConfig {
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: None,
            refresh_token: None,
            scopes: vec![DRIVE_FILE_SCOPE.to_string()],
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            about_url: GOOGLE_ABOUT_URL.to_string(),
        }
    }

    pub fn with_redirect_url(mut self, redirect_url: Option<String>) -> Self {
        self.redirect_url = redirect_url;
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    fn redirect_url(&self) -> Result<&str> {
        self.redirect_url
            .as_deref()
            .ok_or_else(|| Error::config("GOOGLE_REDIRECT_URL is required for the consent flow"))
    }
}

/// Token state as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub has_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Access token present and unexpired.
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn credential_of(token: &OAuthToken) -> Credential {
    Credential {
        access_token: token.access_token.clone(),
        token_type: token.token_type.clone(),
        expires_at: token.expires_at,
    }
}

/// OAuth token lifecycle backed by the store.
pub struct OAuthService {
    config: OAuthConfig,
    client: Client,
    store: Arc<dyn ConfigStore>,
    cached: Mutex<Option<OAuthToken>>,
}

impl OAuthService {
    pub fn new(config: OAuthConfig, client: Client, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            config,
            client,
            store,
            cached: Mutex::new(None),
        }
    }

    /// Consent page URL requesting offline access, so a refresh token is issued.
    pub fn auth_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| Error::config(format!("invalid OAuth auth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_url()?)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Exchange an authorization code and persist the resulting tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenInfo> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::validation("authorization code must not be empty"));
        }
        let redirect_url = self.config.redirect_url()?;

        let response = self
            .request_token(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("redirect_uri", redirect_url),
                ],
                "code exchange",
            )
            .await?;
        let refresh_token = response.refresh_token.clone().ok_or_else(|| {
            Error::auth("code exchange returned no refresh token; consent again for offline use")
        })?;

        let token = self.token_from(response, refresh_token);
        self.store.save_token(&token).await?;
        info!(expires_at = ?token.expires_at, "OAuth authorization code exchanged");

        let info = Self::info_of(Some(&token));
        *self.cached.lock().await = Some(token);
        Ok(info)
    }

    /// Whether a token is stored and its access token is still usable.
    pub async fn token_info(&self) -> Result<TokenInfo> {
        let cached = self.cached.lock().await.clone();
        let token = match cached {
            Some(token) => Some(token),
            None => self.store.get_token(&self.config.client_id).await?,
        };
        Ok(Self::info_of(token.as_ref()))
    }

    /// Check the current credential against the API.
    pub async fn validate_token(&self) -> Result<()> {
        let credential = self.valid_credential().await?;
        let response = self
            .client
            .get(&self.config.about_url)
            .header(header::AUTHORIZATION, credential.authorization_header())
            .query(&[("fields", "user")])
            .send()
            .await
            .map_err(|e| Error::auth(format!("token validation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!("token validation returned {status}: {body}")));
        }
        debug!("OAuth token validated");
        Ok(())
    }

    fn info_of(token: Option<&OAuthToken>) -> TokenInfo {
        match token {
            Some(token) => TokenInfo {
                has_token: true,
                expires_at: token.expires_at,
                valid: token.is_valid_at(Utc::now()),
            },
            None => TokenInfo {
                has_token: false,
                expires_at: None,
                valid: false,
            },
        }
    }

    fn token_from(&self, response: TokenResponse, refresh_token: String) -> OAuthToken {
        OAuthToken {
            client_id: self.config.client_id.clone(),
            access_token: response.access_token,
            refresh_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }

    /// Stored token, or one seeded from the configured refresh token.
    async fn load_token(&self) -> Result<OAuthToken> {
        if let Some(token) = self.store.get_token(&self.config.client_id).await? {
            return Ok(token);
        }
        match &self.config.refresh_token {
            Some(refresh_token) => Ok(OAuthToken {
                client_id: self.config.client_id.clone(),
                access_token: String::new(),
                refresh_token: refresh_token.clone(),
                token_type: "Bearer".to_string(),
                expires_at: None,
            }),
            None => Err(Error::auth(
                "no OAuth token stored; open the authorization URL and exchange the code",
            )),
        }
    }

    async fn request_token(&self, form: &[(&str, &str)], action: &str) -> Result<TokenResponse> {
        debug!(token_url = %self.config.token_url, action, "Requesting OAuth token");
        let response = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::auth(format!("{action} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!("{action} returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::auth(format!("invalid {action} response: {e}")))
    }

    /// Refresh and persist; providers may omit the refresh token, keeping the old one.
    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let response = self
            .request_token(
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("refresh_token", token.refresh_token.as_str()),
                ],
                "token refresh",
            )
            .await?;
        let refresh_token = response
            .refresh_token
            .clone()
            .unwrap_or_else(|| token.refresh_token.clone());

        let refreshed = self.token_from(response, refresh_token);
        self.store.save_token(&refreshed).await?;
        info!(expires_at = ?refreshed.expires_at, "OAuth access token refreshed");
        Ok(refreshed)
    }
}

#[async_trait]
impl Auth for OAuthService {
    async fn valid_credential(&self) -> Result<Credential> {
        // Concurrent callers wait for a single refresh.
        let mut cached = self.cached.lock().await;
        let current = match cached.as_ref() {
            Some(token) => token.clone(),
            None => self.load_token().await?,
        };

        let credential = credential_of(&current);
        if !credential.access_token.is_empty() && !credential.needs_refresh(Utc::now()) {
            *cached = Some(current);
            return Ok(credential);
        }

        let refreshed = self.refresh(&current).await?;
        let credential = credential_of(&refreshed);
        *cached = Some(refreshed);
        Ok(credential)
    }
}
