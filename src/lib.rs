//! Fleet Gateway - sharded Discord gateway using Twilight
//!
//! Besides running a pool of shards, every gateway process:
//! - Publishes a heartbeat row per shard to the status store
//! - Answers fleet-wide collect requests over NATS
//! - Hosts the `/shards` dashboard on top of Discord interactions
//! - Exposes health/ready endpoints and Prometheus metrics

pub mod config;
pub mod dashboard;
pub mod error;
pub mod fleet;
pub mod health;
pub mod interactions;
pub mod metrics;
pub mod nats;
pub mod shard;
pub mod status;
