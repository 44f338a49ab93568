//! Process memory poller
//!
//! Shards share one process, so every shard reports the same resident set.
//! The poller refreshes it on a fixed period instead of on every sample.

use crate::shard::ShardState;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Resident memory of this process in bytes, if the OS exposes it
pub fn resident_memory(system: &mut System, pid: Pid) -> Option<u64> {
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}

/// Refresh `state`'s process memory every `interval` until cancelled
pub async fn run_memory_poller(state: ShardState, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    let mut system = System::new();
    let pid = Pid::from_u32(std::process::id());

    info!(interval_ms = interval.as_millis() as u64, "Process memory poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match resident_memory(&mut system, pid) {
                Some(bytes) => state.set_process_memory(bytes),
                None => debug!(pid = %pid, "Process memory unavailable"),
            },
        }
    }

    debug!("Process memory poller stopped");
}
