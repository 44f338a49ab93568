//! Local metrics sampling
//!
//! Turns the cached shard state into immutable `ShardMetrics` values. Never
//! touches the network or the filesystem; a missing reading degrades to its
//! default instead of failing the sample.

use crate::shard::ShardState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use tokio::time::Instant;

/// Liveness numbers of one shard at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMetrics {
    pub shard_id: u64,
    /// Pool hosting the shard; shards of one pool share a process
    #[serde(default)]
    pub pool_id: u64,
    /// Average gateway latency, -1 when unmeasured
    pub ping_ms: i64,
    pub guild_count: u64,
    pub member_count: u64,
    /// Time since the shard first became ready in this process
    pub uptime_ms: u64,
    /// Resident memory of the hosting process
    pub memory_mb: u64,
}

impl ShardMetrics {
    /// Metrics of a shard nothing is known about yet
    pub fn unknown(shard_id: u64) -> Self {
        Self {
            shard_id,
            pool_id: 0,
            ping_ms: -1,
            guild_count: 0,
            member_count: 0,
            uptime_ms: 0,
            memory_mb: 0,
        }
    }
}

/// Samples shards owned by this process
#[derive(Debug, Clone)]
pub struct MetricsSampler {
    state: ShardState,
}

impl MetricsSampler {
    pub fn new(state: ShardState) -> Self {
        Self { state }
    }

    /// Sample one shard
    pub fn sample(&self, shard_id: u64) -> ShardMetrics {
        let pool_id = self.state.pool_id();
        let memory_mb = bytes_to_mb(self.state.process_memory_bytes());
        let now = Instant::now();

        self.state
            .with_entry(shard_id, |entry| ShardMetrics {
                shard_id,
                pool_id,
                ping_ms: entry.latency_ms.load(Ordering::Relaxed).max(-1),
                guild_count: entry.guild_members.len() as u64,
                member_count: entry.guild_members.values().sum(),
                uptime_ms: entry
                    .connected_at
                    .map(|at| {
                        u64::try_from(now.saturating_duration_since(at).as_millis())
                            .unwrap_or(u64::MAX)
                    })
                    .unwrap_or(0),
                memory_mb,
            })
            .unwrap_or_else(|| ShardMetrics {
                pool_id,
                memory_mb,
                ..ShardMetrics::unknown(shard_id)
            })
    }

    /// Sample every shard of this pool, ascending by shard id
    pub fn sample_all(&self) -> Vec<ShardMetrics> {
        self.state
            .shard_ids()
            .into_iter()
            .map(|id| self.sample(id))
            .collect()
    }
}

/// Rounded to the nearest whole megabyte
fn bytes_to_mb(bytes: u64) -> u64 {
    const MB: u64 = 1024 * 1024;
    (bytes + MB / 2) / MB
}
