//! Operational HTTP surface of one pool
//!
//! `/health` answers as long as the process runs. `/ready` reports whether
//! this pool is doing its share of fleet health reporting: a shard is ready,
//! every status publisher is reporting, and the collect responder is
//! connected when NATS is configured. `/metrics` is the Prometheus scrape.

use crate::metrics::GatewayMetrics;
use crate::nats::NatsControl;
use crate::shard::ShardState;
use crate::status::{PublisherHandle, PublisherState};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub pool_id: u64,
    pub shards_healthy: usize,
}

/// One line per shard owned by this pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardReport {
    pub shard_id: u64,
    pub health: &'static str,
    pub publisher: &'static str,
}

/// Liveness of the NATS collect responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectReport {
    pub connected: bool,
    pub requests_served: u64,
    pub reply_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub pool_id: u64,
    pub shards_total: usize,
    pub shards_ready: usize,
    pub publishers_reporting: usize,
    pub guilds_total: u64,
    /// Absent in local mode
    pub collect: Option<CollectReport>,
    pub shards: Vec<ShardReport>,
}

/// Latest state of every status publisher in the pool, by shard id
#[derive(Debug, Clone, Default)]
pub struct PublisherStates {
    states: Arc<Vec<(u64, watch::Receiver<PublisherState>)>>,
}

impl PublisherStates {
    pub fn new(states: impl IntoIterator<Item = (u64, watch::Receiver<PublisherState>)>) -> Self {
        Self {
            states: Arc::new(states.into_iter().collect()),
        }
    }

    pub fn from_handles(handles: &[PublisherHandle]) -> Self {
        Self::new(handles.iter().map(|h| (h.shard_id, h.state.clone())))
    }

    pub fn get(&self, shard_id: u64) -> Option<PublisherState> {
        self.states
            .iter()
            .find(|(id, _)| *id == shard_id)
            .map(|(_, rx)| *rx.borrow())
    }

    pub fn reporting(&self) -> usize {
        self.states
            .iter()
            .filter(|(_, rx)| *rx.borrow() == PublisherState::Reporting)
            .count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub shard_state: ShardState,
    pub publishers: PublisherStates,
    /// `None` in local mode
    pub nats: Option<Arc<NatsControl>>,
    pub metrics: GatewayMetrics,
}

impl AppState {
    fn shard_reports(&self) -> Vec<ShardReport> {
        self.shard_state
            .shard_ids()
            .into_iter()
            .map(|shard_id| ShardReport {
                shard_id,
                health: self
                    .shard_state
                    .get_health(shard_id)
                    .map_or("unknown", |h| h.as_str()),
                publisher: self
                    .publishers
                    .get(shard_id)
                    .map_or("absent", |p| p.as_str()),
            })
            .collect()
    }

    fn collect_report(&self) -> Option<CollectReport> {
        self.nats.as_ref().map(|nats| CollectReport {
            connected: nats.is_connected(),
            requests_served: nats.requests_served(),
            reply_failures: nats.reply_failures(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        pool_id: state.shard_state.pool_id(),
        shards_healthy: state.shard_state.healthy_shards(),
    })
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let shards_ready = state.shard_state.ready_shards();
    let publishers_reporting = state.publishers.reporting();
    let collect = state.collect_report();

    let ready = shards_ready > 0
        && publishers_reporting == state.publishers.len()
        && collect.as_ref().map_or(true, |c| c.connected);

    let response = ReadyResponse {
        ready,
        pool_id: state.shard_state.pool_id(),
        shards_total: state.shard_state.shard_count(),
        shards_ready,
        publishers_reporting,
        guilds_total: state.shard_state.total_guilds(),
        collect,
        shards: state.shard_reports(),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.set_shards_ready(
        state.shard_state.pool_id(),
        state.shard_state.ready_shards(),
    );

    if let Some(ref nats) = state.nats {
        state.metrics.set_nats_connected(nats.is_connected());
    }

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
