//! NATS integration
//!
//! Carries fleet collect requests between gateway processes.

mod control;

pub use control::NatsControl;
