//! Prometheus metrics module
//!
//! Shard events, heartbeat publishes, fleet collects and dashboard activity.

use crate::error::GatewayError;
use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use twilight_model::gateway::event::Event;

/// Gateway metrics collector
#[derive(Clone)]
pub struct GatewayMetrics {
    handle: Arc<PrometheusHandle>,
}

impl GatewayMetrics {
    /// Install the global Prometheus recorder and return its handle
    pub fn install() -> Result<Self, GatewayError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| GatewayError::MetricsInstall(e.to_string()))?;

        Self::register_metrics();

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Collector that is not wired into the global recorder.
    ///
    /// Recording calls become no-ops unless another recorder is installed;
    /// used by tests and tools that embed the fleet components.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: Arc::new(recorder.handle()),
        }
    }

    /// Register metric descriptions
    fn register_metrics() {
        describe_counter!(
            "gateway_events_received_total",
            Unit::Count,
            "Total events received from Discord"
        );
        describe_counter!(
            "gateway_errors_total",
            Unit::Count,
            "Total gateway errors"
        );
        describe_counter!(
            "fleet_status_publish_total",
            Unit::Count,
            "Status store upserts by status and outcome"
        );
        describe_histogram!(
            "fleet_status_publish_duration_seconds",
            Unit::Seconds,
            "Time to upsert one shard status row"
        );
        describe_histogram!(
            "fleet_collect_duration_seconds",
            Unit::Seconds,
            "Time to gather one fleet snapshot"
        );
        describe_gauge!(
            "fleet_collect_responders",
            Unit::Count,
            "Shards that answered the latest fleet collect"
        );
        describe_counter!(
            "fleet_dashboard_sessions_total",
            Unit::Count,
            "Dashboard sessions opened"
        );
        describe_counter!(
            "fleet_dashboard_actions_total",
            Unit::Count,
            "Dashboard actions by action and outcome"
        );
        describe_gauge!(
            "gateway_shards_ready",
            Unit::Count,
            "Number of shards in ready state"
        );
        describe_gauge!(
            "gateway_guilds_total",
            Unit::Count,
            "Total guilds across all shards"
        );
        describe_gauge!(
            "gateway_nats_connected",
            Unit::Count,
            "NATS connection status (1=connected, 0=disconnected)"
        );
    }

    /// Record an event received
    pub fn record_event(&self, shard_id: u64, event: &Event) {
        let event_type = match event {
            Event::GuildCreate(_) => "guild_create",
            Event::GuildDelete(_) => "guild_delete",
            Event::MemberAdd(_) => "member_add",
            Event::MemberRemove(_) => "member_remove",
            Event::InteractionCreate(_) => "interaction_create",
            Event::Ready(_) => "ready",
            Event::Resumed => "resumed",
            Event::GatewayClose(_) => "gateway_close",
            Event::GatewayHeartbeatAck => "heartbeat_ack",
            _ => "other",
        };

        counter!(
            "gateway_events_received_total",
            "shard_id" => shard_id.to_string(),
            "event_type" => event_type
        )
        .increment(1);
    }

    /// Record gateway error
    pub fn record_error(&self, shard_id: u64, error_type: &'static str) {
        counter!(
            "gateway_errors_total",
            "shard_id" => shard_id.to_string(),
            "error_type" => error_type
        )
        .increment(1);
    }

    /// Record gateway heartbeat ack
    pub fn record_heartbeat(&self, shard_id: u64) {
        gauge!(
            "gateway_last_heartbeat_timestamp",
            "shard_id" => shard_id.to_string()
        )
        .set(chrono::Utc::now().timestamp() as f64);
    }

    /// Record one status store upsert; `outcome` is "ok" or an error label
    pub fn record_status_publish(
        &self,
        shard_id: u64,
        status: &'static str,
        outcome: &'static str,
        duration: Duration,
    ) {
        counter!(
            "fleet_status_publish_total",
            "shard_id" => shard_id.to_string(),
            "status" => status,
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            "fleet_status_publish_duration_seconds",
            "shard_id" => shard_id.to_string()
        )
        .record(duration.as_secs_f64());
    }

    /// Record one fleet collect
    pub fn record_collect(&self, duration: Duration, responders: usize) {
        histogram!("fleet_collect_duration_seconds").record(duration.as_secs_f64());
        gauge!("fleet_collect_responders").set(responders as f64);
    }

    /// Record a dashboard session being opened
    pub fn record_dashboard_opened(&self) {
        counter!("fleet_dashboard_sessions_total").increment(1);
    }

    /// Record a dashboard action and how it was handled
    pub fn record_dashboard_action(&self, action: &'static str, outcome: &'static str) {
        counter!(
            "fleet_dashboard_actions_total",
            "action" => action,
            "outcome" => outcome
        )
        .increment(1);
    }

    /// Set guild count for a shard
    pub fn set_guilds(&self, shard_id: u64, count: u64) {
        gauge!(
            "gateway_guilds_total",
            "shard_id" => shard_id.to_string()
        )
        .set(count as f64);
    }

    /// Set shards ready count
    pub fn set_shards_ready(&self, pool_id: u64, count: usize) {
        gauge!(
            "gateway_shards_ready",
            "pool_id" => pool_id.to_string()
        )
        .set(count as f64);
    }

    /// Set NATS connection status
    pub fn set_nats_connected(&self, connected: bool) {
        gauge!("gateway_nats_connected").set(if connected { 1.0 } else { 0.0 });
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
