//! Shard pool implementation
//!
//! Runs every Discord shard of this process, keeps `ShardState` current and
//! reports transport transitions to the status publishers.

use crate::error::GatewayError;
use crate::interactions::InteractionHandler;
use crate::metrics::GatewayMetrics;
use crate::shard::state::{ShardHealth, ShardState};
use crate::status::ShardLifecycle;

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use twilight_gateway::{Config, EventTypeFlags, Intents, Shard, StreamExt as _};
use twilight_model::gateway::payload::incoming::GuildCreate;
use twilight_model::gateway::{event::Event, ShardId};

/// Number of shards per gateway process (pool)
pub const SHARDS_PER_POOL: u64 = 25;

/// Consecutive receive errors before a shard is declared dead
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Shard ids owned by `pool_id`
pub fn pool_shard_range(pool_id: u64, total_shards: u64) -> std::ops::Range<u64> {
    let start = pool_id.saturating_mul(SHARDS_PER_POOL).min(total_shards);
    let end = pool_id
        .saturating_add(1)
        .saturating_mul(SHARDS_PER_POOL)
        .min(total_shards);
    start..end
}

/// Shard pool managing multiple Discord shards
pub struct ShardPool {
    pool_id: u64,
    shards: Vec<Shard>,
    state: ShardState,
    lifecycle: broadcast::Sender<ShardLifecycle>,
    interactions: Option<Arc<InteractionHandler>>,
    metrics: GatewayMetrics,
}

impl ShardPool {
    /// Create a new shard pool
    ///
    /// # Arguments
    /// * `pool_id` - Pool identifier (0, 1, 2, ...)
    /// * `total_shards` - Total shards across all pools
    /// * `token` - Discord bot token
    /// * `intents` - Discord gateway intents
    /// * `lifecycle` - Sink for shard transport transitions
    /// * `metrics` - Prometheus metrics
    pub fn new(
        pool_id: u64,
        total_shards: u64,
        token: String,
        intents: Intents,
        lifecycle: broadcast::Sender<ShardLifecycle>,
        metrics: GatewayMetrics,
    ) -> Result<Self, GatewayError> {
        let range = pool_shard_range(pool_id, total_shards);

        info!(
            pool_id,
            start_shard = range.start,
            end_shard = range.end,
            shard_count = range.end - range.start,
            "Creating shard pool"
        );

        let state = ShardState::new(pool_id, range.clone(), total_shards);

        // Twilight takes u32 shard ids
        let total_shards_u32 = u32::try_from(total_shards)
            .map_err(|_| GatewayError::ShardIdOverflow { value: total_shards })?;

        let mut shards = Vec::with_capacity((range.end - range.start) as usize);

        for shard_id in range {
            let shard_id_u32 = u32::try_from(shard_id)
                .map_err(|_| GatewayError::ShardIdOverflow { value: shard_id })?;
            let config = Config::new(token.clone(), intents);

            shards.push(Shard::with_config(ShardId::new(shard_id_u32, total_shards_u32), config));
        }

        Ok(Self {
            pool_id,
            shards,
            state,
            lifecycle,
            interactions: None,
            metrics,
        })
    }

    /// Forward `InteractionCreate` events to the dashboard handler
    pub fn with_interactions(mut self, handler: Arc<InteractionHandler>) -> Self {
        self.interactions = Some(handler);
        self
    }

    /// Get the pool ID
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// Get shared state (for health checks and the sampler)
    pub fn state(&self) -> ShardState {
        self.state.clone()
    }

    /// Run all shards in the pool until `cancel` fires or every shard ends
    pub async fn run(self, cancel: CancellationToken) {
        let mut handles = Vec::with_capacity(self.shards.len());

        for shard in self.shards {
            let shard_id: u64 = shard.id().number().into();
            let ctx = ShardContext {
                state: self.state.clone(),
                lifecycle: self.lifecycle.clone(),
                interactions: self.interactions.clone(),
                metrics: self.metrics.clone(),
            };
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                tokio::select! {
                    result = run_shard(shard, ctx) => {
                        if let Err(e) = result {
                            error!(shard_id, error = %e, "Shard task failed");
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!(shard_id, "Shard received shutdown signal");
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!(pool_id = self.pool_id, "Shard pool shut down");
    }
}

/// Everything a shard task shares with the rest of the process
struct ShardContext {
    state: ShardState,
    lifecycle: broadcast::Sender<ShardLifecycle>,
    interactions: Option<Arc<InteractionHandler>>,
    metrics: GatewayMetrics,
}

impl ShardContext {
    fn notify(&self, transition: ShardLifecycle) {
        // No receivers just means no publisher is running for this pool
        let _ = self.lifecycle.send(transition);
    }
}

/// Run a single shard's event loop
async fn run_shard(mut shard: Shard, ctx: ShardContext) -> Result<(), GatewayError> {
    let shard_id: u64 = shard.id().number().into();
    let state = &ctx.state;
    let metrics = &ctx.metrics;

    state.set_health(shard_id, ShardHealth::Connecting);
    info!(shard_id, pool_id = state.pool_id(), "Shard starting");

    let mut consecutive_errors: u32 = 0;

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => {
                consecutive_errors = 0;
                event
            }
            Err(source) => {
                consecutive_errors += 1;
                warn!(shard_id, error = %source, consecutive = consecutive_errors, "Error receiving event");
                ctx.notify(ShardLifecycle::Errored { shard_id });

                if matches!(source.kind(), twilight_gateway::error::ReceiveMessageErrorType::Reconnect) {
                    let err = GatewayError::ShardReconnectFailed {
                        shard_id,
                        source: Box::new(source),
                    };
                    metrics.record_error(shard_id, err.error_type_label());
                    state.set_health(shard_id, ShardHealth::Dead);
                    error!(shard_id, "Fatal gateway error (reconnect failed)");
                    return Err(err);
                }

                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    let err = GatewayError::ShardCircuitBroken {
                        shard_id,
                        count: consecutive_errors,
                        max: MAX_CONSECUTIVE_ERRORS,
                    };
                    metrics.record_error(shard_id, err.error_type_label());
                    state.set_health(shard_id, ShardHealth::Dead);
                    error!(shard_id, consecutive = consecutive_errors, "Shard dead: consecutive error threshold exceeded");
                    return Err(err);
                }

                metrics.record_error(shard_id, "receive_error");
                state.set_health(shard_id, ShardHealth::Disconnected);
                continue;
            }
        };

        state.record_event(shard_id);
        metrics.record_event(shard_id, &event);

        match event {
            Event::Ready(ready) => {
                state.set_health(shard_id, ShardHealth::Ready);
                state.reset_guilds(shard_id, ready.guilds.iter().map(|g| g.id.get()));
                metrics.set_guilds(shard_id, ready.guilds.len() as u64);
                ctx.notify(ShardLifecycle::Resumed { shard_id });
                info!(
                    shard_id,
                    guilds = ready.guilds.len(),
                    session_id = %ready.session_id,
                    "Shard ready"
                );
            }
            Event::Resumed => {
                state.set_health(shard_id, ShardHealth::Ready);
                ctx.notify(ShardLifecycle::Resumed { shard_id });
                info!(shard_id, "Shard resumed");
            }
            Event::GatewayClose(frame) => {
                state.set_health(shard_id, ShardHealth::Resuming);
                ctx.notify(ShardLifecycle::Disconnected { shard_id });
                info!(shard_id, code = frame.as_ref().map(|f| f.code), "Shard disconnected");
            }
            Event::GatewayHeartbeatAck => {
                state.record_heartbeat(shard_id, shard.latency().average());
                metrics.record_heartbeat(shard_id);
            }
            Event::GuildCreate(guild) => {
                let member_count = match guild.as_ref() {
                    GuildCreate::Available(g) => g.member_count,
                    GuildCreate::Unavailable(_) => None,
                };
                state.guild_available(shard_id, guild.id().get(), member_count);
                debug!(shard_id, guild_id = %guild.id(), "Guild available");
            }
            Event::GuildDelete(guild) => {
                // An outage is not a leave
                if guild.unavailable != Some(true) {
                    state.guild_removed(shard_id, guild.id.get());
                }
                debug!(shard_id, guild_id = %guild.id, "Guild left");
            }
            Event::MemberAdd(member) => {
                state.member_added(shard_id, member.guild_id.get());
            }
            Event::MemberRemove(member) => {
                state.member_removed(shard_id, member.guild_id.get());
            }
            Event::InteractionCreate(interaction) => {
                if let Some(handler) = &ctx.interactions {
                    tokio::spawn(Arc::clone(handler).handle(interaction.0));
                }
            }
            _ => {}
        }
    }

    info!(shard_id, "Shard event stream ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shards_per_pool_constant() {
        assert_eq!(SHARDS_PER_POOL, 25);
    }

    #[test]
    fn test_shard_range_calculation() {
        assert_eq!(pool_shard_range(0, 100), 0..25);
        assert_eq!(pool_shard_range(3, 100), 75..100);
    }

    #[test]
    fn last_pool_is_partial() {
        assert_eq!(pool_shard_range(1, 30), 25..30);
        assert_eq!(pool_shard_range(0, 1), 0..1);
    }

    #[test]
    fn pool_beyond_total_is_empty() {
        assert!(pool_shard_range(4, 100).is_empty());
        assert!(pool_shard_range(u64::MAX, 100).is_empty());
    }

    #[tokio::test]
    async fn pool_state_covers_its_range() {
        let (lifecycle, _) = broadcast::channel(8);
        let pool = ShardPool::new(
            1,
            30,
            "token".to_string(),
            Intents::GUILDS,
            lifecycle,
            GatewayMetrics::detached(),
        )
        .unwrap();

        assert_eq!(pool.pool_id(), 1);
        assert_eq!(pool.state().shard_ids(), vec![25, 26, 27, 28, 29]);
        assert_eq!(pool.state().total_shards(), 30);
    }

    #[test]
    fn total_shard_overflow_is_rejected() {
        let (lifecycle, _) = broadcast::channel(8);
        let result = ShardPool::new(
            0,
            u64::from(u32::MAX) + 1,
            "token".to_string(),
            Intents::GUILDS,
            lifecycle,
            GatewayMetrics::detached(),
        );
        assert!(matches!(result, Err(GatewayError::ShardIdOverflow { .. })));
    }
}
