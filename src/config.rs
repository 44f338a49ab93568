//! Gateway configuration module
//!
//! Handles loading configuration from environment variables. Parsing goes
//! through a lookup function so tests never have to mutate the process
//! environment.

use crate::error::GatewayError;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use twilight_gateway::Intents;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Discord bot token
    pub discord_token: String,

    /// Pool ID for this gateway instance (0-indexed)
    /// Each pool manages SHARDS_PER_POOL shards
    pub pool_id: u64,

    /// Total number of shards across all pools
    pub total_shards: u64,

    /// NATS server URL(s) - comma-separated for multiple servers.
    /// Without it the fleet is this process only.
    pub nats_url: Option<String>,

    /// Health/metrics HTTP port
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Heartbeat publisher tuning
    pub heartbeat: HeartbeatSettings,

    /// Supabase status store; `None` keeps rows in memory
    pub supabase: Option<SupabaseConfig>,

    /// Deadline for one fleet-wide collect
    pub collect_timeout: Duration,

    /// Hard interaction window of a dashboard session
    pub dashboard_window: Duration,

    /// Refresh period of the process memory poller
    pub process_stats_interval: Duration,
}

/// Heartbeat timing for the status publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// Target period between two heartbeats
    pub interval: Duration,
    /// Upper bound on one store upsert
    pub timeout: Duration,
    /// Per-publisher jitter is drawn from `[0, jitter_max)`
    pub jitter_max: Duration,
    /// Floor applied to the computed sleep
    pub min_sleep: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            jitter_max: Duration::from_millis(DEFAULT_HEARTBEAT_JITTER_MAX_MS),
            min_sleep: Duration::from_millis(DEFAULT_HEARTBEAT_MIN_SLEEP_MS),
        }
    }
}

/// PostgREST endpoint and key for the `bot_shards` table
#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

// Keep the service key out of debug logs.
impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HEARTBEAT_JITTER_MAX_MS: u64 = 3_000;
pub const DEFAULT_HEARTBEAT_MIN_SLEEP_MS: u64 = 1_000;
pub const DEFAULT_COLLECT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_DASHBOARD_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_PROCESS_STATS_INTERVAL_MS: u64 = 10_000;

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .or_else(|| lookup("DISCORD_BOT_TOKEN"))
            .ok_or_else(|| {
                GatewayError::Config("DISCORD_TOKEN or DISCORD_BOT_TOKEN must be set".to_string())
            })?;

        let pool_id = parse_or(&lookup, &["POOL_ID", "SHARD_ID"], 0u64)?;
        let total_shards = parse_or(&lookup, &["TOTAL_SHARDS"], 1u64)?;
        if total_shards == 0 {
            return Err(GatewayError::Config("TOTAL_SHARDS must be at least 1".to_string()));
        }

        let nats_url = lookup("NATS_URL").filter(|v| !v.trim().is_empty());

        let http_port = parse_or(&lookup, &["HTTP_PORT", "METRICS_PORT"], 9090u16)?;

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let heartbeat = HeartbeatSettings {
            interval: millis_or(
                &lookup,
                &["HEARTBEAT_INTERVAL_MS", "SHARD_REPORT_INTERVAL"],
                DEFAULT_HEARTBEAT_INTERVAL_MS,
            )?,
            timeout: millis_or(
                &lookup,
                &["HEARTBEAT_TIMEOUT_MS", "SHARD_REPORT_TIMEOUT"],
                DEFAULT_HEARTBEAT_TIMEOUT_MS,
            )?,
            jitter_max: millis_or(
                &lookup,
                &["HEARTBEAT_JITTER_MAX_MS"],
                DEFAULT_HEARTBEAT_JITTER_MAX_MS,
            )?,
            min_sleep: millis_or(
                &lookup,
                &["HEARTBEAT_MIN_SLEEP_MS"],
                DEFAULT_HEARTBEAT_MIN_SLEEP_MS,
            )?,
        };
        if heartbeat.timeout.is_zero() {
            return Err(GatewayError::Config(
                "HEARTBEAT_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        let supabase = match (lookup("SUPABASE_URL"), lookup("SUPABASE_KEY")) {
            (Some(url), Some(key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                key,
            }),
            (None, None) => None,
            _ => {
                return Err(GatewayError::Config(
                    "SUPABASE_URL and SUPABASE_KEY must be set together".to_string(),
                ))
            }
        };

        let collect_timeout = millis_or(
            &lookup,
            &["FLEET_COLLECT_TIMEOUT_MS"],
            DEFAULT_COLLECT_TIMEOUT_MS,
        )?;
        let dashboard_window =
            millis_or(&lookup, &["DASHBOARD_WINDOW_MS"], DEFAULT_DASHBOARD_WINDOW_MS)?;
        let process_stats_interval = millis_or(
            &lookup,
            &["PROCESS_STATS_INTERVAL_MS"],
            DEFAULT_PROCESS_STATS_INTERVAL_MS,
        )?;

        Ok(Self {
            discord_token,
            pool_id,
            total_shards,
            nats_url,
            http_port,
            log_level,
            heartbeat,
            supabase,
            collect_timeout,
            dashboard_window,
            process_stats_interval,
        })
    }

    /// Get configured Discord intents
    ///
    /// - GUILDS: guild lifecycle events (guild counts)
    /// - GUILD_MEMBERS: member add/remove (member counts, privileged)
    pub fn intents() -> Intents {
        Intents::GUILDS | Intents::GUILD_MEMBERS
    }
}

/// First key present wins; later keys are legacy aliases.
fn parse_or<F, T>(lookup: &F, keys: &[&str], default: T) -> Result<T, GatewayError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    for key in keys {
        if let Some(raw) = lookup(key) {
            return raw
                .trim()
                .parse()
                .map_err(|e| GatewayError::Config(format!("{key} must be a valid number: {e}")));
        }
    }
    Ok(default)
}

fn millis_or<F>(lookup: &F, keys: &[&str], default_ms: u64) -> Result<Duration, GatewayError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, keys, default_ms).map(Duration::from_millis)
}
