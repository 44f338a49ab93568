//! Shard status reporting
//!
//! Write path of the fleet: every shard publishes its own row to the shared
//! status store. Rows are never written by another shard.

mod publisher;
mod store;
mod supabase;

pub use publisher::{next_sleep, PublisherHandle, PublisherState, ShardLifecycle, StatusPublisher};
pub use store::{MemoryStatusStore, ShardStatus, ShardStatusRow, StatusStore};
pub use supabase::{SupabaseStatusStore, SHARDS_TABLE};
