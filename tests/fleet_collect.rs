//! Fleet aggregator against a scripted control channel

use async_trait::async_trait;
use fleet_gateway::error::GatewayError;
use fleet_gateway::fleet::{
    CollectRequest, ControlChannel, FleetAggregator, ReplyStream, ShardMetrics,
};
use fleet_gateway::metrics::GatewayMetrics;
use futures_util::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const DEADLINE: Duration = Duration::from_secs(2);

fn metrics(shard_id: u64, ping_ms: i64) -> ShardMetrics {
    ShardMetrics {
        shard_id,
        pool_id: 0,
        ping_ms,
        guild_count: 10 + shard_id,
        member_count: 1_000,
        uptime_ms: 60_000,
        memory_mb: 128,
    }
}

/// Every broadcast replays the same replies after their delays.
/// A `None` delay never answers.
struct ScriptedChannel {
    replies: Vec<(Option<Duration>, ShardMetrics)>,
    broadcasts: AtomicUsize,
}

impl ScriptedChannel {
    fn new(replies: Vec<(Option<Duration>, ShardMetrics)>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            broadcasts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ControlChannel for ScriptedChannel {
    async fn broadcast_collect(&self, _request: &CollectRequest) -> Result<ReplyStream, GatewayError> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        for (delay, reply) in self.replies.clone() {
            let tx = tx.clone();
            tokio::spawn(async move {
                match delay {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(reply);
                    }
                    None => {
                        // Hold the sender so the stream stays open
                        std::future::pending::<()>().await;
                        drop(tx);
                    }
                }
            });
        }

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|reply| (reply, rx))
        })))
    }
}

fn aggregator(channel: Arc<ScriptedChannel>, expected: u64) -> FleetAggregator {
    FleetAggregator::new(channel, expected, GatewayMetrics::detached())
}

#[tokio::test(start_paused = true)]
async fn silent_shard_yields_partial_snapshot_at_deadline() {
    let ms = Duration::from_millis;
    let channel = ScriptedChannel::new(vec![
        (Some(ms(40)), metrics(4, 41)),
        (Some(ms(10)), metrics(0, 40)),
        (None, metrics(3, 43)),
        (Some(ms(300)), metrics(2, 42)),
        (Some(ms(25)), metrics(1, 44)),
    ]);

    let started = Instant::now();
    let snapshot = aggregator(channel, 5).collect(DEADLINE).await;

    assert_eq!(snapshot.shard_ids(), vec![0, 1, 2, 4]);
    assert_eq!(started.elapsed(), DEADLINE);

    let totals = snapshot.totals();
    assert_eq!(totals.shards, 4);
    assert_eq!(totals.guilds, 10 + 11 + 12 + 14);
    // (40 + 44 + 42 + 41) / 4 = 41.75
    assert_eq!(totals.avg_ping_ms, Some(42));
}

#[tokio::test(start_paused = true)]
async fn complete_fleet_returns_before_deadline() {
    let ms = Duration::from_millis;
    let channel = ScriptedChannel::new((0..5).map(|id| (Some(ms(10 * (id + 1))), metrics(id, 30))).collect());

    let started = Instant::now();
    let snapshot = aggregator(channel, 5).collect(DEADLINE).await;

    assert_eq!(snapshot.len(), 5);
    assert_eq!(started.elapsed(), ms(50));
}

#[tokio::test(start_paused = true)]
async fn duplicate_replies_keep_the_first() {
    let ms = Duration::from_millis;
    let channel = ScriptedChannel::new(vec![
        (Some(ms(10)), metrics(1, 10)),
        (Some(ms(20)), metrics(1, 99)),
        (Some(ms(30)), metrics(0, 20)),
    ]);

    let snapshot = aggregator(channel, 3).collect(DEADLINE).await;

    assert_eq!(snapshot.shard_ids(), vec![0, 1]);
    assert_eq!(snapshot.shards()[1].ping_ms, 10);
}

#[tokio::test(start_paused = true)]
async fn unknown_ping_is_left_out_of_the_average() {
    let ms = Duration::from_millis;
    let channel = ScriptedChannel::new(vec![
        (Some(ms(10)), metrics(0, -1)),
        (Some(ms(10)), metrics(1, 50)),
    ]);

    let snapshot = aggregator(channel, 2).collect(DEADLINE).await;
    assert_eq!(snapshot.totals().avg_ping_ms, Some(50));
}

#[tokio::test(start_paused = true)]
async fn no_responders_is_an_empty_snapshot() {
    let channel = ScriptedChannel::new(vec![(None, metrics(0, 1))]);

    let snapshot = aggregator(channel, 1).collect(DEADLINE).await;

    assert!(snapshot.is_empty());
    assert_eq!(snapshot.totals().avg_ping_ms, None);
}

#[tokio::test(start_paused = true)]
async fn concurrent_collects_do_not_share_replies() {
    let ms = Duration::from_millis;
    let channel = ScriptedChannel::new(vec![
        (Some(ms(5)), metrics(0, 1)),
        (Some(ms(15)), metrics(1, 1)),
        (None, metrics(2, 1)),
    ]);
    let aggregator = aggregator(Arc::clone(&channel), 3);

    let (a, b) = tokio::join!(aggregator.collect(DEADLINE), aggregator.collect(ms(10)));

    assert_eq!(channel.broadcasts.load(Ordering::SeqCst), 2);
    assert_eq!(a.shard_ids(), vec![0, 1]);
    assert_eq!(b.shard_ids(), vec![0]);
}
