//! Interactive shard dashboard
//!
//! Transport-agnostic: sessions produce `DashboardView`s and the interaction
//! layer turns them into Discord messages.

mod registry;
pub mod render;
mod session;

pub use registry::{Dispatch, SessionRegistry};
pub use render::PAGE_SIZE;
pub use session::{ActionOutcome, Control, DashboardAction, DashboardSession, DashboardView};
