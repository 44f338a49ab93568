//! Discord interaction hosting for the shard dashboard
//!
//! Command registration lives elsewhere; this module only answers the
//! `/shards` command and its buttons.

mod handler;
pub mod payload;

pub use handler::{InteractionHandler, SHARDS_COMMAND};
