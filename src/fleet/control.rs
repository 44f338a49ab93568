//! Fleet control channel
//!
//! A typed request/response protocol replaces shipping code to other shard
//! processes: the aggregator broadcasts a `CollectRequest` and every shard
//! answers with its own `ShardMetrics`.

use crate::error::GatewayError;
use crate::fleet::{MetricsSampler, ShardMetrics};
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

/// Subject every pool listens on for collect requests
pub const COLLECT_SUBJECT: &str = "fleet.control.collect";

/// Replies of one broadcast, in arrival order. Dropping the stream releases
/// whatever subscription feeds it.
pub type ReplyStream = Pin<Box<dyn Stream<Item = ShardMetrics> + Send>>;

/// "Send me your metrics" message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectRequest {
    pub request_id: Uuid,
    /// Unix epoch milliseconds
    pub requested_at: i64,
}

impl CollectRequest {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            requested_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl Default for CollectRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport that can reach every shard of the fleet
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Send `request` to all shards and return the stream of their replies
    async fn broadcast_collect(&self, request: &CollectRequest) -> Result<ReplyStream, GatewayError>;
}

/// Single-process fleet: the local pool is every shard there is
#[derive(Debug, Clone)]
pub struct LocalControlChannel {
    sampler: MetricsSampler,
}

impl LocalControlChannel {
    pub fn new(sampler: MetricsSampler) -> Self {
        Self { sampler }
    }
}

#[async_trait]
impl ControlChannel for LocalControlChannel {
    async fn broadcast_collect(&self, _request: &CollectRequest) -> Result<ReplyStream, GatewayError> {
        Ok(Box::pin(stream::iter(self.sampler.sample_all())))
    }
}
