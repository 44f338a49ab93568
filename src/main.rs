//! Fleet Gateway binary
//!
//! Wires the shard pool, status publishers, fleet control plane, dashboard
//! and health server together and tears them down in order on shutdown.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fleet_gateway::config::GatewayConfig;
use fleet_gateway::fleet::{ControlChannel, FleetAggregator, LocalControlChannel, MetricsSampler};
use fleet_gateway::health::{self, AppState, PublisherStates};
use fleet_gateway::interactions::InteractionHandler;
use fleet_gateway::metrics::GatewayMetrics;
use fleet_gateway::nats::NatsControl;
use fleet_gateway::shard::{self, ShardPool, ShardState};
use fleet_gateway::status::{MemoryStatusStore, StatusPublisher, StatusStore, SupabaseStatusStore};

/// Capacity of the shard lifecycle channel shared by all publishers
const LIFECYCLE_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let gateway_config = GatewayConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("fleet_gateway={}", gateway_config.log_level).parse()?)
                .add_directive("twilight_gateway=info".parse()?)
                .add_directive("async_nats=warn".parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pool_id = gateway_config.pool_id,
        total_shards = gateway_config.total_shards,
        "Starting Fleet Gateway"
    );

    let metrics = GatewayMetrics::install()?;
    info!("Prometheus metrics initialized");

    let nats = if let Some(ref url) = gateway_config.nats_url {
        match NatsControl::connect(url).await {
            Ok(control) => {
                info!(url, "Connected to NATS");
                metrics.set_nats_connected(true);
                Some(control)
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to NATS - running in local mode");
                metrics.set_nats_connected(false);
                None
            }
        }
    } else {
        info!("No NATS_URL configured - running in local mode");
        None
    };

    let store: Arc<dyn StatusStore> = match gateway_config.supabase {
        Some(ref supabase) => {
            info!(url = %supabase.url, "Publishing shard status to Supabase");
            Arc::new(SupabaseStatusStore::new(supabase)?)
        }
        None => {
            warn!("No Supabase configured - shard status kept in memory");
            Arc::new(MemoryStatusStore::new())
        }
    };

    let intents = GatewayConfig::intents();
    info!(?intents, "Using Discord intents");

    let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);

    let pool = ShardPool::new(
        gateway_config.pool_id,
        gateway_config.total_shards,
        gateway_config.discord_token.clone(),
        intents,
        lifecycle_tx.clone(),
        metrics.clone(),
    )?;

    let pool_state = pool.state();
    let sampler = MetricsSampler::new(pool_state.clone());
    info!(
        pool_id = gateway_config.pool_id,
        shard_count = pool_state.shard_count(),
        "Shard pool created"
    );

    // The fleet is every pool behind NATS, or just this process
    let (channel, expected_shards): (Arc<dyn ControlChannel>, u64) = match nats {
        Some(ref control) => (Arc::clone(control) as Arc<dyn ControlChannel>, gateway_config.total_shards),
        None => (
            Arc::new(LocalControlChannel::new(sampler.clone())),
            pool_state.shard_count() as u64,
        ),
    };
    let aggregator = FleetAggregator::new(channel, expected_shards, metrics.clone());

    let http = Arc::new(twilight_http::Client::new(gateway_config.discord_token.clone()));
    let interactions = Arc::new(InteractionHandler::new(
        http,
        aggregator.clone(),
        gateway_config.collect_timeout,
        gateway_config.dashboard_window,
        metrics.clone(),
    ));
    let pool = pool.with_interactions(interactions);

    let cancel = CancellationToken::new();

    let publishers: Vec<_> = pool_state
        .shard_ids()
        .into_iter()
        .map(|shard_id| {
            StatusPublisher::new(
                shard_id,
                Arc::clone(&store),
                sampler.clone(),
                gateway_config.heartbeat,
                metrics.clone(),
            )
            .spawn(lifecycle_tx.subscribe(), cancel.child_token())
        })
        .collect();
    info!(publishers = publishers.len(), "Status publishers started");

    tokio::spawn(shard::run_memory_poller(
        pool_state.clone(),
        gateway_config.process_stats_interval,
        cancel.child_token(),
    ));

    if let Some(ref control) = nats {
        let control = Arc::clone(control);
        let sampler = sampler.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = control.serve_collect(sampler, cancel).await {
                error!(error = %e, "Fleet collect responder failed");
            }
        });
    }

    tokio::spawn(log_fleet_summary(
        pool_state.clone(),
        aggregator,
        gateway_config.collect_timeout,
        cancel.child_token(),
    ));

    let app_state = AppState {
        shard_state: pool_state.clone(),
        publishers: PublisherStates::from_handles(&publishers),
        nats: nats.clone(),
        metrics: metrics.clone(),
    };

    let health_router = health::router(app_state);
    let addr: SocketAddr = ([0, 0, 0, 0], gateway_config.http_port).into();

    info!(port = gateway_config.http_port, "Starting HTTP server");

    let http_server = axum::serve(tokio::net::TcpListener::bind(addr).await?, health_router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned());

    let mut pool_task = tokio::spawn(pool.run(cancel.child_token()));

    tokio::select! {
        _ = &mut pool_task => {
            warn!("Shard pool stopped");
        }
        result = http_server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Shutting down gateway...");
    cancel.cancel();

    if !pool_task.is_finished() {
        let _ = pool_task.await;
    }

    // Each publisher writes its offline row before exiting
    let grace = gateway_config.heartbeat.timeout + Duration::from_secs(1);
    for handle in publishers {
        let shard_id = handle.shard_id;
        if tokio::time::timeout(grace, handle.task).await.is_err() {
            warn!(shard_id, "Status publisher did not stop in time");
        }
    }

    if let Some(ref nats) = nats {
        nats.close().await;
    }

    info!("Gateway shutdown complete");
    Ok(())
}

/// Log one fleet-wide summary once the first local shard is ready
async fn log_fleet_summary(
    state: ShardState,
    aggregator: FleetAggregator,
    deadline: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = state.wait_ready() => {}
    }

    let snapshot = aggregator.collect(deadline).await;
    let totals = snapshot.totals();
    info!(
        shards_reporting = totals.shards,
        shards_expected = aggregator.expected_shards(),
        guilds = totals.guilds,
        members = totals.members,
        avg_ping_ms = totals.avg_ping_ms,
        memory_mb = totals.memory_mb,
        "Fleet summary"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
