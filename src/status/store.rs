//! Status store contract
//!
//! One row per shard id, last write wins. Every upsert overwrites all fields
//! of the row, so repeated heartbeats never grow the table.

use crate::error::GatewayError;
use crate::fleet::ShardMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Persisted shard status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    Online,
    Disconnected,
    Error,
    Offline,
}

impl ShardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the `bot_shards` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStatusRow {
    pub shard_id: u64,
    pub status: ShardStatus,
    pub guilds_count: u64,
    pub users_count: u64,
    pub ping: i64,
    pub uptime_seconds: u64,
    pub memory_mb: u64,
    pub last_heartbeat: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShardStatusRow {
    /// Flatten a metrics sample into a row stamped at `now`
    pub fn from_metrics(metrics: &ShardMetrics, status: ShardStatus, now: DateTime<Utc>) -> Self {
        Self {
            shard_id: metrics.shard_id,
            status,
            guilds_count: metrics.guild_count,
            users_count: metrics.member_count,
            ping: metrics.ping_ms,
            uptime_seconds: metrics.uptime_ms / 1000,
            memory_mb: metrics.memory_mb,
            last_heartbeat: now,
            updated_at: now,
        }
    }
}

/// Durable keyed table of shard statuses
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert or overwrite the row keyed by `row.shard_id`
    async fn upsert(&self, row: &ShardStatusRow) -> Result<(), GatewayError>;
}

/// In-process store, used when no Supabase credentials are configured
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    rows: DashMap<u64, ShardStatusRow>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, shard_id: u64) -> Option<ShardStatusRow> {
        self.rows.get(&shard_id).map(|row| row.clone())
    }

    /// All rows, ascending by shard id
    pub fn rows(&self) -> Vec<ShardStatusRow> {
        let mut rows: Vec<ShardStatusRow> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|r| r.shard_id);
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn upsert(&self, row: &ShardStatusRow) -> Result<(), GatewayError> {
        self.rows.insert(row.shard_id, row.clone());
        Ok(())
    }
}
