//! Dashboard session state machine
//!
//! One session per `/shards` invocation. Only the invoking user can drive it,
//! and it stops accepting actions a fixed window after it was opened. The
//! window is not renewed by activity.

use crate::dashboard::render;
use crate::fleet::{FleetAggregator, FleetSnapshot, FleetTotals};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Navigation and refresh controls, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardAction {
    First,
    Prev,
    Refresh,
    Next,
    Last,
}

impl DashboardAction {
    pub const ALL: [DashboardAction; 5] = [
        DashboardAction::First,
        DashboardAction::Prev,
        DashboardAction::Refresh,
        DashboardAction::Next,
        DashboardAction::Last,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Prev => "prev",
            Self::Refresh => "refresh",
            Self::Next => "next",
            Self::Last => "last",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::First => "⏮️",
            Self::Prev => "◀️",
            Self::Refresh => "🔄",
            Self::Next => "▶️",
            Self::Last => "⏭️",
        }
    }
}

impl fmt::Display for DashboardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DashboardAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or(())
    }
}

/// A control as it should be displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub action: DashboardAction,
    pub disabled: bool,
}

/// Everything the hosting surface needs to draw the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    pub summary: String,
    pub page_label: String,
    pub table: String,
    pub controls: Vec<Control>,
}

impl DashboardView {
    pub fn control(&self, action: DashboardAction) -> Option<Control> {
        self.controls.iter().copied().find(|c| c.action == action)
    }

    pub fn all_disabled(&self) -> bool {
        self.controls.iter().all(|c| c.disabled)
    }
}

/// Result of applying an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// State changed (or stayed clamped); redraw with this view
    Updated(DashboardView),
    /// Actor is not the owner; nothing changed
    NotOwner,
    /// Session window is over; nothing changed, controls are disabled
    Expired(DashboardView),
}

/// Per-invocation dashboard state, owned by exactly one session
#[derive(Debug)]
pub struct DashboardSession {
    id: Uuid,
    owner_id: u64,
    current_page: usize,
    snapshot: FleetSnapshot,
    totals: FleetTotals,
    opened_at: Instant,
    window: Duration,
    collect_deadline: Duration,
    closed: bool,
}

impl DashboardSession {
    /// Collect a fresh snapshot and open on page 0
    pub async fn open(
        owner_id: u64,
        aggregator: &FleetAggregator,
        collect_deadline: Duration,
        window: Duration,
    ) -> Self {
        let snapshot = aggregator.collect(collect_deadline).await;
        Self::with_snapshot(owner_id, snapshot, collect_deadline, window)
    }

    /// Open on page 0 of an already collected snapshot.
    ///
    /// The window starts now.
    pub fn with_snapshot(
        owner_id: u64,
        snapshot: FleetSnapshot,
        collect_deadline: Duration,
        window: Duration,
    ) -> Self {
        let totals = snapshot.totals();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            current_page: 0,
            snapshot,
            totals,
            opened_at: Instant::now(),
            window,
            collect_deadline,
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> u64 {
        self.owner_id
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn snapshot(&self) -> &FleetSnapshot {
        &self.snapshot
    }

    pub fn totals(&self) -> &FleetTotals {
        &self.totals
    }

    pub fn total_pages(&self) -> usize {
        render::total_pages(self.snapshot.len())
    }

    pub fn expires_at(&self) -> Instant {
        self.opened_at + self.window
    }

    pub fn is_expired(&self) -> bool {
        self.closed || Instant::now() >= self.expires_at()
    }

    /// Close the session; every later action is rejected
    pub fn expire(&mut self) -> DashboardView {
        self.closed = true;
        self.view()
    }

    /// Current rendering; controls disabled once expired
    pub fn view(&self) -> DashboardView {
        let total = self.total_pages();
        let last = total - 1;
        let expired = self.is_expired();

        let controls = DashboardAction::ALL
            .into_iter()
            .map(|action| {
                let at_edge = match action {
                    DashboardAction::First | DashboardAction::Prev => self.current_page == 0,
                    DashboardAction::Next | DashboardAction::Last => self.current_page >= last,
                    DashboardAction::Refresh => false,
                };
                Control {
                    action,
                    disabled: expired || at_edge,
                }
            })
            .collect();

        DashboardView {
            summary: render::summary_line(&self.totals),
            page_label: render::page_label(self.current_page, total),
            table: render::render_table(&self.snapshot, self.current_page),
            controls,
        }
    }

    /// Apply `action` on behalf of `actor`
    pub async fn apply(
        &mut self,
        actor: u64,
        action: DashboardAction,
        aggregator: &FleetAggregator,
    ) -> ActionOutcome {
        if actor != self.owner_id {
            return ActionOutcome::NotOwner;
        }
        if self.is_expired() {
            return ActionOutcome::Expired(self.view());
        }

        let last = self.total_pages() - 1;
        match action {
            DashboardAction::First => self.current_page = 0,
            DashboardAction::Prev => self.current_page = self.current_page.saturating_sub(1),
            DashboardAction::Next => self.current_page = (self.current_page + 1).min(last),
            DashboardAction::Last => self.current_page = last,
            DashboardAction::Refresh => {
                let snapshot = aggregator.collect(self.collect_deadline).await;
                self.replace_snapshot(snapshot);
            }
        }

        ActionOutcome::Updated(self.view())
    }

    /// Swap in a new snapshot, keeping the page unless it no longer exists
    fn replace_snapshot(&mut self, snapshot: FleetSnapshot) {
        self.totals = snapshot.totals();
        self.snapshot = snapshot;
        self.current_page = self.current_page.min(self.total_pages() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::ShardMetrics;

    fn snapshot(rows: u64) -> FleetSnapshot {
        FleetSnapshot::from_replies((0..rows).map(|shard_id| ShardMetrics {
            shard_id,
            pool_id: 0,
            ping_ms: 40,
            guild_count: 10,
            member_count: 1_000,
            uptime_ms: 120_000,
            memory_mb: 100,
        }))
    }

    #[test]
    fn actions_round_trip_through_strings() {
        for action in DashboardAction::ALL {
            assert_eq!(action.as_str().parse::<DashboardAction>(), Ok(action));
        }
        assert!("reload".parse::<DashboardAction>().is_err());
    }

    #[tokio::test]
    async fn first_page_disables_backward_controls() {
        let session = DashboardSession::with_snapshot(1, snapshot(23), Duration::ZERO, Duration::from_secs(60));
        let view = session.view();

        assert_eq!(view.page_label, "Page 1/3");
        assert!(view.control(DashboardAction::First).unwrap().disabled);
        assert!(view.control(DashboardAction::Prev).unwrap().disabled);
        assert!(!view.control(DashboardAction::Refresh).unwrap().disabled);
        assert!(!view.control(DashboardAction::Next).unwrap().disabled);
        assert!(!view.control(DashboardAction::Last).unwrap().disabled);
    }

    #[tokio::test]
    async fn empty_snapshot_has_one_page() {
        let session = DashboardSession::with_snapshot(1, FleetSnapshot::default(), Duration::ZERO, Duration::from_secs(60));
        let view = session.view();

        assert_eq!(session.total_pages(), 1);
        assert_eq!(view.page_label, "Page 1/1");
        assert!(view.control(DashboardAction::Next).unwrap().disabled);
        assert!(!view.control(DashboardAction::Refresh).unwrap().disabled);
    }

    #[tokio::test]
    async fn refresh_clamps_page_when_fleet_shrinks() {
        let mut session = DashboardSession::with_snapshot(1, snapshot(23), Duration::ZERO, Duration::from_secs(60));
        session.current_page = 2;
        session.replace_snapshot(snapshot(5));

        assert_eq!(session.current_page(), 0);
        assert_eq!(session.totals().shards, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_expire_closes_early() {
        let mut session = DashboardSession::with_snapshot(1, snapshot(3), Duration::ZERO, Duration::from_secs(60));
        assert!(!session.is_expired());

        let view = session.expire();
        assert!(session.is_expired());
        assert!(view.all_disabled());
    }
}
