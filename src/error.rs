//! Domain error types for the fleet gateway
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All application code returns Result<T, GatewayError>.
//!
//! Nothing in the heartbeat, collect or dashboard paths is fatal: these errors
//! are caught where they originate and turned into a log line or a generic
//! user notice.

use thiserror::Error;

/// Gateway domain errors
///
/// Every variant carries structured context fields for diagnostics.
///
/// Example log output:
/// ```text
/// GatewayError::StatusPublishTimeout { shard_id: 3, timeout_ms: 5000 }
/// → "status publish for shard 3 timed out after 5000ms"
/// ```
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Shard exceeded consecutive error threshold (circuit breaker tripped)
    #[error("shard {shard_id} exceeded consecutive error threshold ({count}/{max})")]
    ShardCircuitBroken {
        shard_id: u64,
        count: u32,
        max: u32,
    },

    /// Shard reconnection failed (fatal, shard marked dead)
    #[error("shard {shard_id} reconnection failed")]
    ShardReconnectFailed {
        shard_id: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Status store rejected or failed an upsert
    #[error("status publish failed for shard {shard_id}")]
    StatusPublishFailed {
        shard_id: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Status store answered with a non-success HTTP status
    #[error("status store returned {status} for shard {shard_id}: {body}")]
    StatusStoreRejected {
        shard_id: u64,
        status: u16,
        body: String,
    },

    /// Status upsert did not complete within the per-call timeout
    #[error("status publish for shard {shard_id} timed out after {timeout_ms}ms")]
    StatusPublishTimeout { shard_id: u64, timeout_ms: u64 },

    /// NATS publish failed for a specific subject
    #[error("NATS publish failed for subject '{subject}'")]
    NatsPublishFailed {
        subject: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// NATS subscription could not be created
    #[error("NATS subscribe failed for subject '{subject}'")]
    NatsSubscribeFailed {
        subject: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// NATS connection failed
    #[error("NATS connection failed")]
    NatsConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Control-plane or interaction payload could not be (de)serialized
    #[error("serialization failed for {what}")]
    SerializationFailed {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Discord REST call failed
    #[error("Discord HTTP request failed during {operation}")]
    DiscordHttp {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Prometheus recorder could not be installed
    #[error("metrics recorder installation failed: {0}")]
    MetricsInstall(String),

    /// Configuration error (environment variable missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// Shard ID overflow: u64 value exceeds u32::MAX (Twilight API boundary)
    #[error("shard ID overflow: {value} exceeds u32::MAX")]
    ShardIdOverflow { value: u64 },
}

impl GatewayError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on `gateway_errors_total` and
    /// `fleet_status_publish_total`.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::ShardCircuitBroken { .. } => "circuit_broken",
            Self::ShardReconnectFailed { .. } => "reconnect_failed",
            Self::StatusPublishFailed { .. } => "status_publish",
            Self::StatusStoreRejected { .. } => "status_rejected",
            Self::StatusPublishTimeout { .. } => "status_timeout",
            Self::NatsPublishFailed { .. } => "nats_publish",
            Self::NatsSubscribeFailed { .. } => "nats_subscribe",
            Self::NatsConnectionFailed(_) => "nats_connection",
            Self::SerializationFailed { .. } => "serialization",
            Self::DiscordHttp { .. } => "discord_http",
            Self::MetricsInstall(_) => "metrics_install",
            Self::Config(_) => "config",
            Self::ShardIdOverflow { .. } => "shard_overflow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_error() -> Box<dyn std::error::Error + Send + Sync> {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, "test"))
    }

    #[test]
    fn every_variant_has_distinct_error_type_label() {
        let labels = [
            GatewayError::ShardCircuitBroken { shard_id: 0, count: 10, max: 10 }
                .error_type_label(),
            GatewayError::ShardReconnectFailed {
                shard_id: 0,
                source: test_error(),
            }
            .error_type_label(),
            GatewayError::StatusPublishFailed {
                shard_id: 0,
                source: test_error(),
            }
            .error_type_label(),
            GatewayError::StatusStoreRejected {
                shard_id: 0,
                status: 500,
                body: String::new(),
            }
            .error_type_label(),
            GatewayError::StatusPublishTimeout { shard_id: 0, timeout_ms: 1 }.error_type_label(),
            GatewayError::NatsPublishFailed {
                subject: "test".to_string(),
                source: test_error(),
            }
            .error_type_label(),
            GatewayError::NatsSubscribeFailed {
                subject: "test".to_string(),
                source: test_error(),
            }
            .error_type_label(),
            GatewayError::NatsConnectionFailed(test_error()).error_type_label(),
            GatewayError::SerializationFailed {
                what: "test",
                source: serde_json::from_str::<()>("invalid").unwrap_err(),
            }
            .error_type_label(),
            GatewayError::DiscordHttp {
                operation: "test",
                source: test_error(),
            }
            .error_type_label(),
            GatewayError::MetricsInstall("test".to_string()).error_type_label(),
            GatewayError::Config("test".to_string()).error_type_label(),
            GatewayError::ShardIdOverflow { value: u64::MAX }.error_type_label(),
        ];

        let mut unique = labels.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(labels.len(), unique.len(), "Duplicate error_type_label found");
    }

    #[test]
    fn error_messages_contain_context() {
        let err = GatewayError::StatusPublishTimeout {
            shard_id: 3,
            timeout_ms: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("shard 3"), "message should contain shard_id");
        assert!(msg.contains("5000ms"), "message should contain timeout");

        let err = GatewayError::StatusStoreRejected {
            shard_id: 7,
            status: 409,
            body: "conflict".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("shard 7"));

        let err = GatewayError::NatsPublishFailed {
            subject: "fleet.control.collect".to_string(),
            source: test_error(),
        };
        assert!(err.to_string().contains("fleet.control.collect"));
    }

    #[test]
    fn config_error_preserves_message() {
        let err = GatewayError::Config("DISCORD_TOKEN must be set".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: DISCORD_TOKEN must be set"
        );
    }
}
