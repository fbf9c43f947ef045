//! Notification fan-out across several channels.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use lazy_backup::database::{ConfigStore, InMemoryConfigStore};
use lazy_backup::domain::{
    ArtifactInfo, BackupRun, ChannelConfig, ChannelKind, ChannelSettings,
};
use lazy_backup::notification::{
    ChannelFactory, ChannelRegistry, Message, NotificationChannel, NotificationDispatcher,
    NotificationEvent,
};
use lazy_backup::notification::channels::WebhookFactory;
use lazy_backup::utils::http_client::install_rustls_provider;
use lazy_backup::{Error, Result};

/// Sleeps, then succeeds or fails.
struct SlowChannel {
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl NotificationChannel for SlowChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn validate_config(&self, _settings: &ChannelSettings) -> Result<()> {
        Ok(())
    }

    async fn send(&self, _message: &Message) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(Error::delivery("slack", "500 Internal Server Error"));
        }
        Ok(())
    }
}

struct SlowFactory;

impl ChannelFactory for SlowFactory {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn validate(&self, _settings: &ChannelSettings) -> Result<()> {
        Ok(())
    }

    fn build(&self, settings: &ChannelSettings) -> Result<Arc<dyn NotificationChannel>> {
        Ok(Arc::new(SlowChannel {
            delay: Duration::from_millis(
                settings.get("delay_ms").and_then(|v| v.as_u64()).unwrap_or(0),
            ),
            fail: settings.get("fail").and_then(|v| v.as_bool()).unwrap_or(false),
        }))
    }
}

fn settings(value: serde_json::Value) -> ChannelSettings {
    value.as_object().cloned().unwrap()
}

fn success_event() -> NotificationEvent {
    let mut run = BackupRun::start("nightly", "mysql");
    run.complete_success(ArtifactInfo {
        name: "nightly_20240101.sql".to_string(),
        id: "D1".to_string(),
        size: 2048,
    })
    .unwrap();
    NotificationEvent::from_run(&run, Some("https://x/D1".to_string()))
}

#[tokio::test]
async fn fan_out_is_concurrent_and_isolates_failures() {
    let store = Arc::new(InMemoryConfigStore::new());
    let registry = Arc::new(ChannelRegistry::new());
    registry.register(Arc::new(SlowFactory));
    let dispatcher =
        NotificationDispatcher::new(store.clone(), registry, Duration::from_secs(5));

    for (name, fail) in [("a", false), ("b", false), ("broken", true)] {
        store
            .save_channel(&ChannelConfig::new(
                name,
                ChannelKind::Slack,
                settings(json!({ "delay_ms": 200, "fail": fail })),
            ))
            .await
            .unwrap();
    }

    let started = Instant::now();
    let results = dispatcher.dispatch_success(&success_event()).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);
    let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].channel_name, "broken");
    assert!(failed[0].error.as_deref().unwrap().contains("500"));
    assert!(
        elapsed < Duration::from_millis(550),
        "deliveries ran sequentially: {elapsed:?}"
    );

    let stats = dispatcher.stats();
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn slow_channel_times_out_without_blocking_others() {
    let store = Arc::new(InMemoryConfigStore::new());
    let registry = Arc::new(ChannelRegistry::new());
    registry.register(Arc::new(SlowFactory));
    let dispatcher =
        NotificationDispatcher::new(store.clone(), registry, Duration::from_millis(100));

    store
        .save_channel(&ChannelConfig::new(
            "fast",
            ChannelKind::Slack,
            settings(json!({})),
        ))
        .await
        .unwrap();
    store
        .save_channel(&ChannelConfig::new(
            "stuck",
            ChannelKind::Slack,
            settings(json!({ "delay_ms": 5_000 })),
        ))
        .await
        .unwrap();

    let started = Instant::now();
    let results = dispatcher.dispatch_success(&success_event()).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    let stuck = results.iter().find(|r| r.channel_name == "stuck").unwrap();
    assert!(!stuck.success);
    let fast = results.iter().find(|r| r.channel_name == "fast").unwrap();
    assert!(fast.success);
}

#[tokio::test]
async fn test_channel_with_invalid_webhook_url_errors_and_keeps_config() {
    install_rustls_provider();
    let store = Arc::new(InMemoryConfigStore::new());
    let registry = Arc::new(ChannelRegistry::new());
    registry.register(Arc::new(WebhookFactory::new(reqwest::Client::new())));
    let dispatcher =
        NotificationDispatcher::new(store.clone(), registry, Duration::from_secs(1));

    let config = ChannelConfig::new(
        "hook",
        ChannelKind::Webhook,
        settings(json!({ "url": "not a url" })),
    );
    store.save_channel(&config).await.unwrap();

    let err = dispatcher.test_channel("hook").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let stored = store.get_channel("hook").await.unwrap();
    assert_eq!(stored, config);

    assert!(matches!(
        dispatcher.test_channel("missing").await,
        Err(Error::NotFound { .. })
    ));
}
