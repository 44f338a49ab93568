//! Per-shard status publisher
//!
//! Each shard gets one `StatusPublisher` running as its own task. It upserts
//! an `online` row every heartbeat, reacts to shard lifecycle transitions out
//! of band and writes a final `offline` row when cancelled. No store failure
//! ever leaves this module: they are logged with the shard id and dropped.

use crate::config::HeartbeatSettings;
use crate::error::GatewayError;
use crate::fleet::MetricsSampler;
use crate::metrics::GatewayMetrics;
use crate::status::{ShardStatus, ShardStatusRow, StatusStore};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publisher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Starting,
    Reporting,
    Stopping,
    Stopped,
}

impl PublisherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublisherState::Starting => "starting",
            PublisherState::Reporting => "reporting",
            PublisherState::Stopping => "stopping",
            PublisherState::Stopped => "stopped",
        }
    }
}

/// Shard transport transition reported by the shard event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardLifecycle {
    /// Gateway connection closed
    Disconnected { shard_id: u64 },
    /// Session resumed or a fresh READY arrived
    Resumed { shard_id: u64 },
    /// Receiving from the gateway failed
    Errored { shard_id: u64 },
}

impl ShardLifecycle {
    pub fn shard_id(&self) -> u64 {
        match *self {
            Self::Disconnected { shard_id }
            | Self::Resumed { shard_id }
            | Self::Errored { shard_id } => shard_id,
        }
    }

    /// Status row this transition is published as
    pub fn status(&self) -> ShardStatus {
        match self {
            Self::Disconnected { .. } => ShardStatus::Disconnected,
            Self::Resumed { .. } => ShardStatus::Online,
            Self::Errored { .. } => ShardStatus::Error,
        }
    }
}

/// Sleep after a tick that took `elapsed`.
///
/// `max(min_sleep, interval + jitter - elapsed)`; never negative, never below
/// the floor even when the tick overran the whole interval.
pub fn next_sleep(settings: &HeartbeatSettings, jitter: Duration, elapsed: Duration) -> Duration {
    settings
        .interval
        .saturating_add(jitter)
        .saturating_sub(elapsed)
        .max(settings.min_sleep)
}

/// Heartbeat publisher for one shard
pub struct StatusPublisher {
    shard_id: u64,
    store: Arc<dyn StatusStore>,
    sampler: MetricsSampler,
    settings: HeartbeatSettings,
    /// Drawn once so the fleet's heartbeats don't line up on the store
    jitter: Duration,
    metrics: GatewayMetrics,
    state: watch::Sender<PublisherState>,
}

/// Running publisher task
pub struct PublisherHandle {
    pub shard_id: u64,
    pub state: watch::Receiver<PublisherState>,
    pub task: JoinHandle<()>,
}

impl StatusPublisher {
    pub fn new(
        shard_id: u64,
        store: Arc<dyn StatusStore>,
        sampler: MetricsSampler,
        settings: HeartbeatSettings,
        metrics: GatewayMetrics,
    ) -> Self {
        let jitter = draw_jitter(settings.jitter_max);
        let (state, _) = watch::channel(PublisherState::Starting);

        Self {
            shard_id,
            store,
            sampler,
            settings,
            jitter,
            metrics,
            state,
        }
    }

    /// Replace the random jitter with a fixed one
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn shard_id(&self) -> u64 {
        self.shard_id
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PublisherState> {
        self.state.subscribe()
    }

    /// Spawn the heartbeat loop as a background task
    pub fn spawn(
        self,
        lifecycle: broadcast::Receiver<ShardLifecycle>,
        cancel: CancellationToken,
    ) -> PublisherHandle {
        let shard_id = self.shard_id;
        let state = self.subscribe_state();
        let task = tokio::spawn(self.run(lifecycle, cancel));
        PublisherHandle {
            shard_id,
            state,
            task,
        }
    }

    /// Heartbeat loop; returns after the terminal `offline` publish
    pub async fn run(
        self,
        lifecycle: broadcast::Receiver<ShardLifecycle>,
        cancel: CancellationToken,
    ) {
        let mut lifecycle = Some(lifecycle);

        self.transition(PublisherState::Reporting);
        info!(
            shard_id = self.shard_id,
            interval_ms = self.settings.interval.as_millis() as u64,
            jitter_ms = self.jitter.as_millis() as u64,
            "Status publisher started"
        );

        let mut tick_started = Instant::now();
        self.publish_logged(ShardStatus::Online, "startup").await;

        loop {
            let pause = next_sleep(&self.settings, self.jitter, tick_started.elapsed());
            if !self.wait(pause, &mut lifecycle, &cancel).await {
                break;
            }

            tick_started = Instant::now();
            self.publish_logged(ShardStatus::Online, "heartbeat").await;
        }

        self.transition(PublisherState::Stopping);
        self.publish_logged(ShardStatus::Offline, "shutdown").await;
        self.transition(PublisherState::Stopped);
        info!(shard_id = self.shard_id, "Status publisher stopped");
    }

    /// Sleep for `pause`, publishing lifecycle transitions as they arrive.
    /// Returns false once cancellation is observed.
    async fn wait(
        &self,
        pause: Duration,
        lifecycle: &mut Option<broadcast::Receiver<ShardLifecycle>>,
        cancel: &CancellationToken,
    ) -> bool {
        let deadline = Instant::now() + pause;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(deadline) => return true,
                received = next_lifecycle(lifecycle) => match received {
                    Ok(event) if event.shard_id() == self.shard_id => {
                        debug!(shard_id = self.shard_id, ?event, "Shard lifecycle transition");
                        self.publish_logged(event.status(), "lifecycle").await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(shard_id = self.shard_id, skipped, "Lifecycle events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        *lifecycle = None;
                    }
                },
            }
        }
    }

    /// Publish and swallow the outcome into logs and metrics
    async fn publish_logged(&self, status: ShardStatus, reason: &'static str) {
        let started = Instant::now();
        let result = self.publish(status).await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.metrics
                    .record_status_publish(self.shard_id, status.as_str(), "ok", elapsed);
                debug!(shard_id = self.shard_id, %status, reason, "Status published");
            }
            Err(e) => {
                self.metrics.record_status_publish(
                    self.shard_id,
                    status.as_str(),
                    e.error_type_label(),
                    elapsed,
                );
                warn!(shard_id = self.shard_id, %status, reason, error = %e, "Status publish failed");
            }
        }
    }

    /// One upsert bounded by the configured timeout
    async fn publish(&self, status: ShardStatus) -> Result<(), GatewayError> {
        let metrics = self.sampler.sample(self.shard_id);
        let row = ShardStatusRow::from_metrics(&metrics, status, chrono::Utc::now());

        tokio::time::timeout(self.settings.timeout, self.store.upsert(&row))
            .await
            .map_err(|_| GatewayError::StatusPublishTimeout {
                shard_id: self.shard_id,
                timeout_ms: self.settings.timeout.as_millis() as u64,
            })?
    }

    fn transition(&self, next: PublisherState) {
        self.state.send_replace(next);
    }
}

/// Next lifecycle event, or never once the channel is gone
async fn next_lifecycle(
    lifecycle: &mut Option<broadcast::Receiver<ShardLifecycle>>,
) -> Result<ShardLifecycle, broadcast::error::RecvError> {
    match lifecycle {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn draw_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}
