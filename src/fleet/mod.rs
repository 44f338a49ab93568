//! Fleet metrics: local sampling and the fleet-wide live collect

mod aggregator;
mod control;
mod sampler;
mod snapshot;

pub use aggregator::FleetAggregator;
pub use control::{
    CollectRequest, ControlChannel, LocalControlChannel, ReplyStream, COLLECT_SUBJECT,
};
pub use sampler::{MetricsSampler, ShardMetrics};
pub use snapshot::{FleetSnapshot, FleetTotals};
