//! Shard management module
//!
//! Shard pools, the per-shard state they maintain and the process memory poller
//! that feeds memory figures into it.

mod pool;
mod process;
mod state;

pub use pool::{pool_shard_range, ShardPool, SHARDS_PER_POOL};
pub use process::{resident_memory, run_memory_poller};
pub use state::{ShardHealth, ShardState, ShardStateEntry};
