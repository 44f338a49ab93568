//! Shard state tracking
//!
//! Tracks health and the cached liveness numbers of every shard in the pool.
//! The metrics sampler only ever reads from here.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Health status for a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardHealth {
    /// Shard is connecting
    Connecting,
    /// Shard is ready and receiving events
    Ready,
    /// Shard is resuming after disconnect
    Resuming,
    /// Shard is disconnected
    Disconnected,
    /// Shard encountered a fatal error
    Dead,
}

impl ShardHealth {
    /// Returns true if the shard is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, ShardHealth::Ready | ShardHealth::Resuming)
    }

    /// Returns true if the shard is ready to receive events
    pub fn is_ready(&self) -> bool {
        matches!(self, ShardHealth::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShardHealth::Connecting => "connecting",
            ShardHealth::Ready => "ready",
            ShardHealth::Resuming => "resuming",
            ShardHealth::Disconnected => "disconnected",
            ShardHealth::Dead => "dead",
        }
    }
}

/// State for a single shard
#[derive(Debug)]
pub struct ShardStateEntry {
    pub health: ShardHealth,
    /// guild id → last known member count
    pub guild_members: HashMap<u64, u64>,
    pub events_received: AtomicU64,
    /// Average gateway heartbeat latency, -1 until measured
    pub latency_ms: AtomicI64,
    pub last_heartbeat: Option<Instant>,
    /// First time the shard became ready in this process
    pub connected_at: Option<Instant>,
}

impl Default for ShardStateEntry {
    fn default() -> Self {
        Self {
            health: ShardHealth::Connecting,
            guild_members: HashMap::new(),
            events_received: AtomicU64::new(0),
            latency_ms: AtomicI64::new(-1),
            last_heartbeat: None,
            connected_at: None,
        }
    }
}

/// Shared state across all shards in a pool
#[derive(Debug, Clone)]
pub struct ShardState {
    inner: Arc<ShardStateInner>,
}

#[derive(Debug)]
struct ShardStateInner {
    pool_id: u64,
    shards: DashMap<u64, ShardStateEntry>,
    total_shards: u64,
    /// Resident memory of this process, refreshed by the process memory poller
    process_memory_bytes: AtomicU64,
    first_ready: Notify,
}

impl ShardState {
    /// Create a new shard state tracker
    pub fn new(pool_id: u64, shard_ids: impl Iterator<Item = u64>, total_shards: u64) -> Self {
        let shards = DashMap::new();
        for shard_id in shard_ids {
            shards.insert(shard_id, ShardStateEntry::default());
        }

        Self {
            inner: Arc::new(ShardStateInner {
                pool_id,
                shards,
                total_shards,
                process_memory_bytes: AtomicU64::new(0),
                first_ready: Notify::new(),
            }),
        }
    }

    /// Get the pool ID
    pub fn pool_id(&self) -> u64 {
        self.inner.pool_id
    }

    /// Get total shards across the cluster
    pub fn total_shards(&self) -> u64 {
        self.inner.total_shards
    }

    /// Shard ids owned by this pool, ascending
    pub fn shard_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.inner.shards.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Update shard health
    pub fn set_health(&self, shard_id: u64, health: ShardHealth) {
        let mut became_ready = false;
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.health = health;
            if health == ShardHealth::Ready && entry.connected_at.is_none() {
                entry.connected_at = Some(Instant::now());
                became_ready = true;
            }
        }
        if became_ready {
            self.inner.first_ready.notify_waiters();
        }
    }

    /// Resolves once at least one shard in the pool is ready
    pub async fn wait_ready(&self) {
        loop {
            let notified = self.inner.first_ready.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }

    /// Replace every known guild of a shard (READY payload)
    pub fn reset_guilds(&self, shard_id: u64, guild_ids: impl Iterator<Item = u64>) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            let previous = std::mem::take(&mut entry.guild_members);
            entry.guild_members = guild_ids
                .map(|id| (id, previous.get(&id).copied().unwrap_or(0)))
                .collect();
        }
    }

    /// Guild became available on a shard
    pub fn guild_available(&self, shard_id: u64, guild_id: u64, member_count: Option<u64>) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            let slot = entry.guild_members.entry(guild_id).or_insert(0);
            if let Some(count) = member_count {
                *slot = count;
            }
        }
    }

    /// Guild removed from a shard (left, kicked or deleted)
    pub fn guild_removed(&self, shard_id: u64, guild_id: u64) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.guild_members.remove(&guild_id);
        }
    }

    /// Member joined a guild owned by this shard
    pub fn member_added(&self, shard_id: u64, guild_id: u64) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            if let Some(count) = entry.guild_members.get_mut(&guild_id) {
                *count += 1;
            }
        }
    }

    /// Member left a guild owned by this shard
    pub fn member_removed(&self, shard_id: u64, guild_id: u64) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            if let Some(count) = entry.guild_members.get_mut(&guild_id) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Increment event received counter
    pub fn record_event(&self, shard_id: u64) {
        if let Some(entry) = self.inner.shards.get(&shard_id) {
            entry.events_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record heartbeat ack and the shard's current average latency
    pub fn record_heartbeat(&self, shard_id: u64, latency: Option<Duration>) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.last_heartbeat = Some(Instant::now());
            if let Some(latency) = latency {
                let ms = i64::try_from(latency.as_millis()).unwrap_or(i64::MAX);
                entry.latency_ms.store(ms, Ordering::Relaxed);
            }
        }
    }

    /// Store the latest resident memory reading of this process
    pub fn set_process_memory(&self, bytes: u64) {
        self.inner
            .process_memory_bytes
            .store(bytes, Ordering::Relaxed);
    }

    /// Latest resident memory reading of this process, 0 if never sampled
    pub fn process_memory_bytes(&self) -> u64 {
        self.inner.process_memory_bytes.load(Ordering::Relaxed)
    }

    /// Get health for a specific shard
    pub fn get_health(&self, shard_id: u64) -> Option<ShardHealth> {
        self.inner.shards.get(&shard_id).map(|e| e.health)
    }

    /// Read a shard entry without holding the map lock beyond `f`
    pub fn with_entry<R>(&self, shard_id: u64, f: impl FnOnce(&ShardStateEntry) -> R) -> Option<R> {
        self.inner.shards.get(&shard_id).map(|e| f(e.value()))
    }

    /// Get total events received across all shards
    pub fn total_events_received(&self) -> u64 {
        self.inner
            .shards
            .iter()
            .map(|e| e.events_received.load(Ordering::Relaxed))
            .sum()
    }

    /// Get total guilds across all shards
    pub fn total_guilds(&self) -> u64 {
        self.inner
            .shards
            .iter()
            .map(|e| e.guild_members.len() as u64)
            .sum()
    }

    /// Get count of ready shards
    pub fn ready_shards(&self) -> usize {
        self.inner
            .shards
            .iter()
            .filter(|e| e.health.is_ready())
            .count()
    }

    /// Get count of healthy shards (ready or resuming)
    pub fn healthy_shards(&self) -> usize {
        self.inner
            .shards
            .iter()
            .filter(|e| e.health.is_healthy())
            .count()
    }

    /// Get total shard count in this pool
    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// Check if pool is ready (at least one shard ready)
    pub fn is_ready(&self) -> bool {
        self.ready_shards() > 0
    }

    /// Check if pool is fully healthy
    pub fn is_healthy(&self) -> bool {
        self.healthy_shards() == self.shard_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ShardState {
        ShardState::new(0, 0..2, 2)
    }

    #[test]
    fn member_counts_follow_guild_events() {
        let state = state();
        state.guild_available(0, 10, Some(5));
        state.guild_available(0, 11, None);
        state.member_added(0, 10);
        state.member_added(0, 11);
        state.member_removed(0, 10);
        state.member_removed(0, 10);

        let members: u64 = state
            .with_entry(0, |e| e.guild_members.values().sum())
            .unwrap();
        assert_eq!(members, 3 + 1);
        assert_eq!(state.total_guilds(), 2);

        state.guild_removed(0, 10);
        assert_eq!(state.total_guilds(), 1);
    }

    #[test]
    fn member_events_for_unknown_guild_are_ignored() {
        let state = state();
        state.member_added(0, 99);
        assert_eq!(state.total_guilds(), 0);
    }

    #[test]
    fn reset_guilds_keeps_known_counts() {
        let state = state();
        state.guild_available(1, 1, Some(40));
        state.guild_available(1, 2, Some(7));
        state.reset_guilds(1, [1, 3].into_iter());

        let counts = state.with_entry(1, |e| e.guild_members.clone()).unwrap();
        assert_eq!(counts.get(&1), Some(&40));
        assert_eq!(counts.get(&3), Some(&0));
        assert!(!counts.contains_key(&2));
    }

    #[test]
    fn latency_stays_unknown_until_measured() {
        let state = state();
        let before = state.with_entry(0, |e| e.latency_ms.load(Ordering::Relaxed));
        assert_eq!(before, Some(-1));

        state.record_heartbeat(0, None);
        assert_eq!(state.with_entry(0, |e| e.latency_ms.load(Ordering::Relaxed)), Some(-1));

        state.record_heartbeat(0, Some(Duration::from_millis(42)));
        assert_eq!(state.with_entry(0, |e| e.latency_ms.load(Ordering::Relaxed)), Some(42));
    }

    #[test]
    fn connected_at_is_set_once() {
        let state = state();
        state.set_health(0, ShardHealth::Ready);
        let first = state.with_entry(0, |e| e.connected_at).flatten();
        state.set_health(0, ShardHealth::Disconnected);
        state.set_health(0, ShardHealth::Ready);
        let second = state.with_entry(0, |e| e.connected_at).flatten();

        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(state.is_ready());
        assert!(!state.is_healthy());
    }

    #[test]
    fn wait_ready_resolves_after_first_ready() {
        let state = state();
        let mut waiter = tokio_test::task::spawn(state.wait_ready());
        tokio_test::assert_pending!(waiter.poll());

        state.set_health(1, ShardHealth::Connecting);
        tokio_test::assert_pending!(waiter.poll());

        state.set_health(1, ShardHealth::Ready);
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[test]
    fn wait_ready_is_immediate_when_already_ready() {
        let state = state();
        state.set_health(0, ShardHealth::Ready);
        tokio_test::assert_ready!(tokio_test::task::spawn(state.wait_ready()).poll());
    }
}
