//! NATS control plane
//!
//! Collect requests go out on `fleet.control.collect` with a fresh reply
//! inbox. Every pool answers with one message per local shard on that inbox.

use crate::error::GatewayError;
use crate::fleet::{CollectRequest, ControlChannel, MetricsSampler, ReplyStream, ShardMetrics, COLLECT_SUBJECT};
use async_nats::{Client, Message};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// NATS connection used for fleet control traffic
pub struct NatsControl {
    client: Client,
    connected: AtomicBool,
    requests_served: AtomicU64,
    reply_failures: AtomicU64,
}

impl NatsControl {
    /// Connect to NATS server
    pub async fn connect(servers: &str) -> Result<Arc<Self>, GatewayError> {
        info!(servers, "Connecting to NATS");

        let client = async_nats::connect(servers)
            .await
            .map_err(|e| GatewayError::NatsConnectionFailed(Box::new(e)))?;

        Ok(Arc::new(Self {
            client,
            connected: AtomicBool::new(true),
            requests_served: AtomicU64::new(0),
            reply_failures: AtomicU64::new(0),
        }))
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Collect requests answered by this process
    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    /// Replies that could not be published
    pub fn reply_failures(&self) -> u64 {
        self.reply_failures.load(Ordering::Relaxed)
    }

    /// Answer collect requests for the local shards until cancelled
    pub async fn serve_collect(
        self: Arc<Self>,
        sampler: MetricsSampler,
        cancel: CancellationToken,
    ) -> Result<(), GatewayError> {
        let mut requests = self
            .client
            .subscribe(COLLECT_SUBJECT)
            .await
            .map_err(|e| GatewayError::NatsSubscribeFailed {
                subject: COLLECT_SUBJECT.to_string(),
                source: Box::new(e),
            })?;

        info!(subject = COLLECT_SUBJECT, "Serving fleet collect requests");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = requests.next() => match message {
                    Some(message) => self.answer(&sampler, message).await,
                    None => {
                        warn!(subject = COLLECT_SUBJECT, "Collect subscription closed");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    async fn answer(&self, sampler: &MetricsSampler, message: Message) {
        let Some(reply) = message.reply else {
            debug!("Collect request without reply inbox ignored");
            return;
        };

        let request_id = match serde_json::from_slice::<CollectRequest>(&message.payload) {
            Ok(request) => request.request_id.to_string(),
            Err(e) => {
                warn!(error = %e, "Malformed collect request");
                return;
            }
        };

        for metrics in sampler.sample_all() {
            let payload = match serde_json::to_vec(&metrics) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(shard_id = metrics.shard_id, error = %e, "Failed to serialize shard metrics");
                    continue;
                }
            };

            if let Err(e) = self.client.publish(reply.clone(), payload.into()).await {
                self.reply_failures.fetch_add(1, Ordering::Relaxed);
                warn!(shard_id = metrics.shard_id, request_id = %request_id, error = %e, "Failed to reply to collect request");
            }
        }

        self.requests_served.fetch_add(1, Ordering::Relaxed);
        debug!(request_id = %request_id, "Collect request answered");
    }

    /// Graceful shutdown
    pub async fn close(&self) {
        info!("Closing NATS connection");
        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = self.client.flush().await {
            debug!(error = %e, "NATS flush on close failed");
        }
    }
}

#[async_trait]
impl ControlChannel for NatsControl {
    async fn broadcast_collect(&self, request: &CollectRequest) -> Result<ReplyStream, GatewayError> {
        let inbox = self.client.new_inbox();
        // Subscribe before publishing so no early reply is missed.
        let replies = self
            .client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| GatewayError::NatsSubscribeFailed {
                subject: inbox.clone(),
                source: Box::new(e),
            })?;

        let payload = serde_json::to_vec(request).map_err(|source| GatewayError::SerializationFailed {
            what: "collect request",
            source,
        })?;

        self.client
            .publish_with_reply(COLLECT_SUBJECT, inbox, payload.into())
            .await
            .map_err(|e| GatewayError::NatsPublishFailed {
                subject: COLLECT_SUBJECT.to_string(),
                source: Box::new(e),
            })?;

        // Dropping the subscriber unsubscribes the inbox.
        Ok(Box::pin(replies.filter_map(|message| async move {
            decode_reply(&message.payload)
        })))
    }
}

fn decode_reply(payload: &[u8]) -> Option<ShardMetrics> {
    match serde_json::from_slice(payload) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!(error = %e, "Malformed collect reply dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_decoding() {
        let metrics = ShardMetrics {
            shard_id: 12,
            pool_id: 0,
            ping_ms: -1,
            guild_count: 3,
            member_count: 9,
            uptime_ms: 1_000,
            memory_mb: 64,
        };
        let payload = serde_json::to_vec(&metrics).unwrap();
        assert_eq!(decode_reply(&payload), Some(metrics));
        assert_eq!(decode_reply(b"{\"shard_id\":1}"), None);
        assert_eq!(decode_reply(b"not json"), None);
    }

    #[test]
    fn test_subject_constant() {
        assert_eq!(COLLECT_SUBJECT, "fleet.control.collect");
    }
}
