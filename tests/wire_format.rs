//! Wire format conformance tests
//!
//! Collect requests and shard metrics cross process boundaries over NATS, and
//! status rows are read by other services straight out of `bot_shards`.
//! These tests pin the JSON shape of all three.

use chrono::{TimeZone, Utc};
use fleet_gateway::fleet::{CollectRequest, ShardMetrics};
use fleet_gateway::status::{ShardStatus, ShardStatusRow};
use serde_json::{json, Value};
use uuid::Uuid;

/// Columns of `bot_shards` written on every upsert
const STATUS_ROW_COLUMNS: &[&str] = &[
    "shard_id",
    "status",
    "guilds_count",
    "users_count",
    "ping",
    "uptime_seconds",
    "memory_mb",
    "last_heartbeat",
    "updated_at",
];

const SHARD_METRICS_FIELDS: &[&str] = &[
    "shard_id",
    "pool_id",
    "ping_ms",
    "guild_count",
    "member_count",
    "uptime_ms",
    "memory_mb",
];

fn deterministic_metrics() -> ShardMetrics {
    ShardMetrics {
        shard_id: 17,
        pool_id: 2,
        ping_ms: 52,
        guild_count: 1_204,
        member_count: 389_112,
        uptime_ms: 7_384_912,
        memory_mb: 311,
    }
}

fn keys(value: &Value) -> Vec<String> {
    let mut keys: Vec<String> = value
        .as_object()
        .unwrap_or_else(|| panic!("not a JSON object: {value}"))
        .keys()
        .cloned()
        .collect();
    keys.sort();
    keys
}

fn sorted(fields: &[&str]) -> Vec<String> {
    let mut fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    fields.sort();
    fields
}

#[test]
fn shard_metrics_reply_shape() {
    let actual = serde_json::to_value(deterministic_metrics()).unwrap();
    let expected = json!({
        "shard_id": 17,
        "pool_id": 2,
        "ping_ms": 52,
        "guild_count": 1204,
        "member_count": 389112,
        "uptime_ms": 7384912,
        "memory_mb": 311
    });

    assert_eq!(actual, expected);
    assert_eq!(keys(&actual), sorted(SHARD_METRICS_FIELDS));
}

#[test]
fn unknown_ping_travels_as_minus_one() {
    let actual = serde_json::to_value(ShardMetrics::unknown(3)).unwrap();
    assert_eq!(actual["ping_ms"], json!(-1));

    let back: ShardMetrics = serde_json::from_value(actual).unwrap();
    assert_eq!(back, ShardMetrics::unknown(3));
}

#[test]
fn replies_without_pool_default_to_pool_zero() {
    let reply = json!({
        "shard_id": 4,
        "ping_ms": 30,
        "guild_count": 1,
        "member_count": 2,
        "uptime_ms": 3,
        "memory_mb": 4
    });
    let metrics: ShardMetrics = serde_json::from_value(reply).unwrap();
    assert_eq!(metrics.pool_id, 0);
}

#[test]
fn collect_request_shape() {
    let request = CollectRequest {
        request_id: Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap(),
        requested_at: 1_700_000_000_000,
    };

    let actual = serde_json::to_value(&request).unwrap();
    assert_eq!(
        actual,
        json!({
            "request_id": "00000000-0000-4000-8000-000000000001",
            "requested_at": 1700000000000_i64
        })
    );
}

#[test]
fn collect_request_ids_are_valid_uuids() {
    let actual = serde_json::to_value(CollectRequest::new()).unwrap();
    let request_id = actual["request_id"].as_str().expect("request_id should be a string");
    Uuid::parse_str(request_id)
        .unwrap_or_else(|e| panic!("invalid request_id '{request_id}': {e}"));
}

#[test]
fn status_row_columns() {
    let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap();
    let row = ShardStatusRow::from_metrics(&deterministic_metrics(), ShardStatus::Online, now);

    let actual = serde_json::to_value(&row).unwrap();
    assert_eq!(keys(&actual), sorted(STATUS_ROW_COLUMNS));
    assert_eq!(
        actual,
        json!({
            "shard_id": 17,
            "status": "online",
            "guilds_count": 1204,
            "users_count": 389112,
            "ping": 52,
            "uptime_seconds": 7384,
            "memory_mb": 311,
            "last_heartbeat": "2024-03-09T12:30:00Z",
            "updated_at": "2024-03-09T12:30:00Z"
        })
    );
}

#[test]
fn status_values_are_lowercase() {
    for (status, wire) in [
        (ShardStatus::Online, "online"),
        (ShardStatus::Disconnected, "disconnected"),
        (ShardStatus::Error, "error"),
        (ShardStatus::Offline, "offline"),
    ] {
        assert_eq!(serde_json::to_value(status).unwrap(), json!(wire));
        assert_eq!(status.as_str(), wire);
    }
}
