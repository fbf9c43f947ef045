//! Process configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::scheduler::parse_timezone;
use crate::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite:lazy-backup.db?mode=rwc";

/// Where artifacts are uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Directories under a local root.
    Local { root: PathBuf },
    /// Google Drive through OAuth.
    ///
    /// Tokens live in the store once the consent flow has run; a configured
    /// refresh token seeds the store when it is still empty.
    Drive {
        client_id: String,
        client_secret: String,
        refresh_token: Option<String>,
        redirect_url: Option<String>,
    },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: PathBuf,
    pub backup_temp_dir: PathBuf,
    pub scheduler_tick_ms: u64,
    /// Zone cron expressions are evaluated in.
    pub scheduler_timezone: Tz,
    pub notification_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub http_timeout: Duration,
    /// Budget for one artifact upload, separate from `http_timeout`.
    pub upload_timeout: Duration,
    pub storage: StorageBackend,
    /// Authorization code to exchange for a Drive token at startup.
    pub auth_code: Option<String>,
    /// JSON file of jobs and channels that replaces the stored ones at startup.
    pub sync_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the process environment (and `.env`, if present).
    ///
    /// Environment variables:
    /// - `DATABASE_URL`: SQLite store (default: `sqlite:lazy-backup.db?mode=rwc`)
    /// - `LOG_DIR`: log directory (default: `logs`)
    /// - `BACKUP_TEMP_DIR`: artifact staging directory (default: `<tmp>/db-backups`)
    /// - `SCHEDULER_TICK_MS`: clock resolution (default: 1000)
    /// - `SCHEDULER_TIMEZONE`: IANA zone for cron evaluation (default: `TZ` if it
    ///   names a zone, else UTC)
    /// - `NOTIFICATION_TIMEOUT_SECS`: per-channel send timeout (default: 30)
    /// - `SHUTDOWN_TIMEOUT_SECS`: drain budget on shutdown (default: 30)
    /// - `HTTP_TIMEOUT_SECS`: storage metadata and auth HTTP timeout (default: 60)
    /// - `UPLOAD_TIMEOUT_SECS`: one artifact upload (default: 14400; 0 falls back to
    ///   `HTTP_TIMEOUT_SECS`)
    /// - `STORAGE_BACKEND`: `local` (default) or `drive`
    /// - `LOCAL_STORAGE_DIR`: root for `local` (default: `backups`)
    /// - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`: required for `drive`
    /// - `GOOGLE_REFRESH_TOKEN`: optional seed token for `drive`
    /// - `GOOGLE_REDIRECT_URL`: redirect URI for the consent flow
    /// - `GOOGLE_AUTH_CODE`: authorization code exchanged at startup
    /// - `SYNC_CONFIG_FILE`: JSON file of jobs and channels applied at startup
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    Error::config(format!("{key} must be a non-negative integer, got '{raw}'"))
                }),
                None => Ok(default),
            }
        };

        let storage = match get("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => StorageBackend::Local {
                root: get("LOCAL_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("backups")),
            },
            "drive" => {
                let required = |key: &str| {
                    get(key).ok_or_else(|| {
                        Error::config(format!("{key} is required when STORAGE_BACKEND=drive"))
                    })
                };
                StorageBackend::Drive {
                    client_id: required("GOOGLE_CLIENT_ID")?,
                    client_secret: required("GOOGLE_CLIENT_SECRET")?,
                    refresh_token: get("GOOGLE_REFRESH_TOKEN"),
                    redirect_url: get("GOOGLE_REDIRECT_URL"),
                }
            }
            other => {
                return Err(Error::config(format!(
                    "unknown STORAGE_BACKEND '{other}', expected local or drive"
                )));
            }
        };

        let scheduler_timezone = match get("SCHEDULER_TIMEZONE") {
            Some(name) => parse_timezone(&name).map_err(|_| {
                Error::config(format!(
                    "SCHEDULER_TIMEZONE '{name}' is not a valid IANA timezone"
                ))
            })?,
            None => get("TZ")
                .and_then(|name| parse_timezone(&name).ok())
                .unwrap_or(chrono_tz::UTC),
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            log_dir: get("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            backup_temp_dir: get("BACKUP_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("db-backups")),
            scheduler_tick_ms: number("SCHEDULER_TICK_MS", 1_000)?.max(1),
            scheduler_timezone,
            notification_timeout: Duration::from_secs(number("NOTIFICATION_TIMEOUT_SECS", 30)?),
            shutdown_timeout: Duration::from_secs(number("SHUTDOWN_TIMEOUT_SECS", 30)?),
            http_timeout: Duration::from_secs(number("HTTP_TIMEOUT_SECS", 60)?),
            upload_timeout: Duration::from_secs(number("UPLOAD_TIMEOUT_SECS", 4 * 60 * 60)?),
            storage,
            auth_code: get("GOOGLE_AUTH_CODE"),
            sync_file: get("SYNC_CONFIG_FILE").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.scheduler_tick_ms, 1_000);
        assert_eq!(config.notification_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.http_timeout, Duration::from_secs(60));
        assert_eq!(config.upload_timeout, Duration::from_secs(14_400));
        assert_eq!(config.scheduler_timezone, chrono_tz::UTC);
        assert!(config.auth_code.is_none());
        assert!(config.sync_file.is_none());
        assert_eq!(
            config.storage,
            StorageBackend::Local {
                root: PathBuf::from("backups")
            }
        );
    }

    #[test]
    fn test_drive_requires_credentials() {
        let err = load(&[("STORAGE_BACKEND", "drive"), ("GOOGLE_CLIENT_ID", "id")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("GOOGLE_CLIENT_SECRET")));
    }

    #[test]
    fn test_drive_backend() {
        let config = load(&[
            ("STORAGE_BACKEND", "Drive"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REFRESH_TOKEN", "refresh"),
        ])
        .unwrap();
        assert!(matches!(
            config.storage,
            StorageBackend::Drive { ref client_id, .. } if client_id == "id"
        ));
    }

    #[test]
    fn test_drive_without_refresh_token_uses_consent_flow() {
        let config = load(&[
            ("STORAGE_BACKEND", "drive"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REDIRECT_URL", "http://localhost:8080/callback"),
            ("GOOGLE_AUTH_CODE", "4/abc"),
        ])
        .unwrap();
        assert_eq!(
            config.storage,
            StorageBackend::Drive {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                refresh_token: None,
                redirect_url: Some("http://localhost:8080/callback".to_string()),
            }
        );
        assert_eq!(config.auth_code.as_deref(), Some("4/abc"));
    }

    #[test]
    fn test_scheduler_timezone() {
        let config = load(&[("SCHEDULER_TIMEZONE", "Asia/Ho_Chi_Minh")]).unwrap();
        assert_eq!(config.scheduler_timezone, chrono_tz::Asia::Ho_Chi_Minh);

        let err = load(&[("SCHEDULER_TIMEZONE", "Nowhere/Special")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("SCHEDULER_TIMEZONE")));
    }

    #[test]
    fn test_timezone_falls_back_to_tz() {
        let config = load(&[("TZ", "Europe/Berlin")]).unwrap();
        assert_eq!(config.scheduler_timezone, chrono_tz::Europe::Berlin);

        // POSIX-style TZ strings are ignored.
        let config = load(&[("TZ", ":/etc/localtime")]).unwrap();
        assert_eq!(config.scheduler_timezone, chrono_tz::UTC);

        let config = load(&[("TZ", "Europe/Berlin"), ("SCHEDULER_TIMEZONE", "UTC")]).unwrap();
        assert_eq!(config.scheduler_timezone, chrono_tz::UTC);
    }

    #[test]
    fn test_upload_timeout_is_separate_from_http_timeout() {
        let config =
            load(&[("HTTP_TIMEOUT_SECS", "10"), ("UPLOAD_TIMEOUT_SECS", "7200")]).unwrap();
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.upload_timeout, Duration::from_secs(7_200));
    }

    #[test]
    fn test_sync_file_path() {
        let config = load(&[("SYNC_CONFIG_FILE", "/etc/lazy-backup/sync.json")]).unwrap();
        assert_eq!(config.sync_file, Some(PathBuf::from("/etc/lazy-backup/sync.json")));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = load(&[("SCHEDULER_TICK_MS", "fast")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(load(&[("STORAGE_BACKEND", "s3")]).is_err());
    }
}
