//! Fleet-wide snapshot and derived totals

use crate::fleet::ShardMetrics;
use std::collections::{BTreeMap, HashSet};

/// Point-in-time metrics of every shard that answered a collect.
///
/// Sorted ascending by shard id, one entry per shard. Shards that did not
/// answer are absent: a missing id means "unknown", not "down".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSnapshot {
    shards: Vec<ShardMetrics>,
}

impl FleetSnapshot {
    /// Build from replies in arrival order. The first reply per shard wins.
    pub fn from_replies(replies: impl IntoIterator<Item = ShardMetrics>) -> Self {
        let mut seen = HashSet::new();
        let mut shards: Vec<ShardMetrics> = replies
            .into_iter()
            .filter(|m| seen.insert(m.shard_id))
            .collect();
        shards.sort_by_key(|m| m.shard_id);
        Self { shards }
    }

    pub fn shards(&self) -> &[ShardMetrics] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Ids present in the snapshot, ascending
    pub fn shard_ids(&self) -> Vec<u64> {
        self.shards.iter().map(|m| m.shard_id).collect()
    }

    /// Rows of page `page` (0-based); empty past the end
    pub fn page(&self, page: usize, page_size: usize) -> &[ShardMetrics] {
        let start = page.saturating_mul(page_size).min(self.shards.len());
        let end = start.saturating_add(page_size).min(self.shards.len());
        &self.shards[start..end]
    }

    pub fn totals(&self) -> FleetTotals {
        FleetTotals::from_shards(&self.shards)
    }
}

/// Aggregates over the responders of one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetTotals {
    pub shards: usize,
    /// Mean over shards with a measured ping, rounded half up
    pub avg_ping_ms: Option<i64>,
    pub guilds: u64,
    pub members: u64,
    /// Resident memory of the hosting processes, each pool counted once
    pub memory_mb: u64,
}

impl FleetTotals {
    pub fn from_shards(shards: &[ShardMetrics]) -> Self {
        let measured: Vec<i64> = shards
            .iter()
            .map(|m| m.ping_ms)
            .filter(|p| *p >= 0)
            .collect();
        let avg_ping_ms = if measured.is_empty() {
            None
        } else {
            let n = measured.len() as i64;
            let sum: i64 = measured.iter().sum();
            Some((2 * sum + n) / (2 * n))
        };

        let mut per_pool: BTreeMap<u64, u64> = BTreeMap::new();
        for m in shards {
            let pool = per_pool.entry(m.pool_id).or_default();
            *pool = (*pool).max(m.memory_mb);
        }

        Self {
            shards: shards.len(),
            avg_ping_ms,
            guilds: shards.iter().map(|m| m.guild_count).sum(),
            members: shards.iter().map(|m| m.member_count).sum(),
            memory_mb: per_pool.values().sum(),
        }
    }
}
