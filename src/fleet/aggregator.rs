//! Fleet aggregator
//!
//! Broadcasts one collect request and gathers replies until every expected
//! shard answered or the deadline passes, whichever comes first. Read-only:
//! never touches the status store.

use crate::fleet::{CollectRequest, ControlChannel, FleetSnapshot, ShardMetrics};
use crate::metrics::GatewayMetrics;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Live collect across every shard in the fleet
#[derive(Clone)]
pub struct FleetAggregator {
    channel: Arc<dyn ControlChannel>,
    expected_shards: usize,
    metrics: GatewayMetrics,
}

impl FleetAggregator {
    /// `expected_shards` is the fleet size; collection ends early once that
    /// many distinct shards replied.
    pub fn new(channel: Arc<dyn ControlChannel>, expected_shards: u64, metrics: GatewayMetrics) -> Self {
        Self {
            channel,
            expected_shards: usize::try_from(expected_shards).unwrap_or(usize::MAX),
            metrics,
        }
    }

    pub fn expected_shards(&self) -> usize {
        self.expected_shards
    }

    /// Gather a snapshot, possibly partial, within `deadline`
    pub async fn collect(&self, deadline: Duration) -> FleetSnapshot {
        let started = Instant::now();
        let request = CollectRequest::new();

        // Per-call buffers: concurrent collects never share state.
        let mut seen = HashSet::with_capacity(self.expected_shards);
        let mut replies: Vec<ShardMetrics> = Vec::with_capacity(self.expected_shards);

        let gather = async {
            let mut stream = match self.channel.broadcast_collect(&request).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(request_id = %request.request_id, error = %e, "Fleet collect broadcast failed");
                    return;
                }
            };

            while let Some(metrics) = stream.next().await {
                if seen.insert(metrics.shard_id) {
                    replies.push(metrics);
                }
                if seen.len() >= self.expected_shards {
                    break;
                }
            }
        };

        let timed_out = tokio::time::timeout(deadline, gather).await.is_err();

        let snapshot = FleetSnapshot::from_replies(replies);
        let elapsed = started.elapsed();
        self.metrics.record_collect(elapsed, snapshot.len());

        if snapshot.len() < self.expected_shards {
            debug!(
                request_id = %request.request_id,
                responders = snapshot.len(),
                expected = self.expected_shards,
                timed_out,
                elapsed_ms = elapsed.as_millis() as u64,
                "Fleet collect returned a partial snapshot"
            );
        } else {
            debug!(
                request_id = %request.request_id,
                responders = snapshot.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Fleet collect complete"
            );
        }

        snapshot
    }
}
