//! Supabase (PostgREST) status store
//!
//! Upserts into `bot_shards` with `on_conflict=shard_id`, so each shard owns
//! exactly one row.

use crate::config::SupabaseConfig;
use crate::error::GatewayError;
use crate::status::{ShardStatusRow, StatusStore};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

/// Table holding one status row per shard
pub const SHARDS_TABLE: &str = "bot_shards";

pub struct SupabaseStatusStore {
    http: reqwest::Client,
    endpoint: String,
}

impl SupabaseStatusStore {
    pub fn new(config: &SupabaseConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&config.key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", config.key))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build Supabase client: {e}")))?;

        Ok(Self {
            http,
            endpoint: upsert_endpoint(&config.url),
        })
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(raw)
        .map_err(|_| GatewayError::Config("SUPABASE_KEY contains invalid header characters".to_string()))
}

fn upsert_endpoint(base_url: &str) -> String {
    format!(
        "{}/rest/v1/{SHARDS_TABLE}?on_conflict=shard_id",
        base_url.trim_end_matches('/')
    )
}

#[async_trait]
impl StatusStore for SupabaseStatusStore {
    async fn upsert(&self, row: &ShardStatusRow) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(row)
            .send()
            .await
            .map_err(|e| GatewayError::StatusPublishFailed {
                shard_id: row.shard_id,
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::StatusStoreRejected {
                shard_id: row.shard_id,
                status: status.as_u16(),
                body,
            });
        }

        debug!(shard_id = row.shard_id, status = %row.status, "Shard status upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_targets_shard_table_with_conflict_key() {
        assert_eq!(
            upsert_endpoint("https://abc.supabase.co/"),
            "https://abc.supabase.co/rest/v1/bot_shards?on_conflict=shard_id"
        );
    }

    #[test]
    fn invalid_key_is_a_config_error() {
        let config = SupabaseConfig {
            url: "https://abc.supabase.co".to_string(),
            key: "bad\nkey".to_string(),
        };
        let err = SupabaseStatusStore::new(&config).err().unwrap();
        assert_eq!(err.error_type_label(), "config");
    }
}
