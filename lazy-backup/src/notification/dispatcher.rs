//! Notification dispatcher.
//!
//! The dispatcher is responsible for:
//! - Loading enabled channel configs and filtering them by outcome
//! - Rendering a channel-specific message per destination
//! - Delivering to every destination concurrently with a per-send timeout
//! - Reporting one [`DeliveryResult`] per destination
//!
//! A failing or slow channel never affects the others, and nothing is retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::channels::{ChannelRegistry, NotificationChannel};
use super::events::{DeliveryResult, Message, NotificationEvent};
use crate::database::ConfigStore;
use crate::domain::ChannelConfig;
use crate::{Error, Result};

/// Default per-channel send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Cumulative dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Number of fan-outs and channel tests.
    pub dispatches: u64,
    /// Deliveries that succeeded.
    pub delivered: u64,
    /// Deliveries that failed, timed out or could not be built.
    pub failed: u64,
}

/// Fans run outcomes out to configured channels.
pub struct NotificationDispatcher {
    store: Arc<dyn ConfigStore>,
    registry: Arc<ChannelRegistry>,
    send_timeout: Duration,
    dispatches: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        registry: Arc<ChannelRegistry>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            send_timeout,
            dispatches: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Notify every enabled channel with `notify_on_success`.
    pub async fn dispatch_success(&self, event: &NotificationEvent) -> Vec<DeliveryResult> {
        self.fan_out(event, true).await
    }

    /// Notify every enabled channel with `notify_on_error`.
    pub async fn dispatch_failure(&self, event: &NotificationEvent) -> Vec<DeliveryResult> {
        self.fan_out(event, false).await
    }

    /// Route by the event's outcome.
    pub async fn dispatch(&self, event: &NotificationEvent) -> Vec<DeliveryResult> {
        if event.is_success() {
            self.dispatch_success(event).await
        } else {
            self.dispatch_failure(event).await
        }
    }

    async fn fan_out(&self, event: &NotificationEvent, success: bool) -> Vec<DeliveryResult> {
        self.dispatches.fetch_add(1, Ordering::Relaxed);

        let channels = match self.store.list_enabled_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(job = %event.job_name, error = %e, "Failed to load notification channels");
                return Vec::new();
            }
        };

        let targets: Vec<ChannelConfig> = channels
            .into_iter()
            .filter(|c| c.wants(success))
            .collect();

        if targets.is_empty() {
            debug!(job = %event.job_name, "No channels subscribed to this outcome");
            return Vec::new();
        }

        let results = join_all(targets.iter().map(|config| self.deliver(config, event))).await;

        let ok = results.iter().filter(|r| r.success).count();
        info!(
            job = %event.job_name,
            outcome = %event.outcome,
            delivered = ok,
            failed = results.len() - ok,
            "Notifications dispatched"
        );

        results
    }

    async fn deliver(&self, config: &ChannelConfig, event: &NotificationEvent) -> DeliveryResult {
        let outcome: Result<()> = async {
            let factory = self.registry.factory(config.kind)?;
            let channel = factory.build(&config.settings)?;
            let message = factory.render(event);
            self.send_with_timeout(channel.as_ref(), &message, &config.name)
                .await
        }
        .await;

        let result = match outcome {
            Ok(()) => DeliveryResult::delivered(&config.name, config.kind),
            Err(e) => DeliveryResult::failed(&config.name, config.kind, e.to_string()),
        };
        self.record(&result);
        result
    }

    async fn send_with_timeout(
        &self,
        channel: &dyn NotificationChannel,
        message: &Message,
        name: &str,
    ) -> Result<()> {
        match tokio::time::timeout(self.send_timeout, channel.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "channel {name} did not respond within {:?}",
                self.send_timeout
            ))),
        }
    }

    fn record(&self, result: &DeliveryResult) {
        if result.success {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(
                channel = %result.channel_name,
                kind = %result.channel_kind,
                error = result.error.as_deref().unwrap_or_default(),
                "Notification delivery failed"
            );
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Send a synthetic info message to one stored channel.
    ///
    /// Works for disabled channels too. Never modifies the stored config.
    pub async fn test_channel(&self, name: &str) -> Result<DeliveryResult> {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        let config = self.store.get_channel(name).await?;

        let outcome: Result<()> = async {
            let channel = self.registry.factory(config.kind)?.build(&config.settings)?;
            let message = Message::test(&config.name, config.kind);
            self.send_with_timeout(channel.as_ref(), &message, &config.name)
                .await
        }
        .await;

        let result = match &outcome {
            Ok(()) => DeliveryResult::delivered(&config.name, config.kind),
            Err(e) => DeliveryResult::failed(&config.name, config.kind, e.to_string()),
        };
        self.record(&result);

        outcome.map(|()| result)
    }

    /// Validate a channel config against its kind's rules.
    pub fn validate_channel(&self, config: &ChannelConfig) -> Result<()> {
        if config.name.trim().is_empty() {
            return Err(Error::validation("channel name must not be empty"));
        }
        self.registry.factory(config.kind)?.validate(&config.settings)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
