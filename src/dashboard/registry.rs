//! Live dashboard sessions
//!
//! Each session sits behind its own async mutex. An action that arrives while
//! another one (typically a refresh) is still running is turned away instead
//! of queueing, so two collects never race to overwrite the same session.
//! Ownership is checked outside the lock: a stranger is refused even while the
//! owner's refresh holds the session.

use crate::dashboard::{ActionOutcome, DashboardAction, DashboardSession};
use crate::fleet::FleetAggregator;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// What happened to an action routed through the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No such session (expired and dropped, or never existed)
    Unknown,
    /// Session is busy with a previous action; this one was dropped
    Busy,
    Handled(ActionOutcome),
}

#[derive(Debug)]
struct SessionEntry {
    owner_id: u64,
    session: Arc<Mutex<DashboardSession>>,
}

#[derive(Debug, Default, Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its shared handle
    pub fn insert(&self, session: DashboardSession) -> Arc<Mutex<DashboardSession>> {
        let id = session.id();
        let owner_id = session.owner_id();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(
            id,
            SessionEntry {
                owner_id,
                session: Arc::clone(&handle),
            },
        );
        handle
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Mutex<DashboardSession>>> {
        self.sessions.get(id).map(|e| Arc::clone(&e.session))
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Mutex<DashboardSession>>> {
        self.sessions.remove(id).map(|(_, e)| e.session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Route an action to its session without waiting on a busy one
    pub async fn dispatch(
        &self,
        id: &Uuid,
        actor: u64,
        action: DashboardAction,
        aggregator: &FleetAggregator,
    ) -> Dispatch {
        let Some((owner_id, session)) = self
            .sessions
            .get(id)
            .map(|e| (e.owner_id, Arc::clone(&e.session)))
        else {
            return Dispatch::Unknown;
        };

        if actor != owner_id {
            return Dispatch::Handled(ActionOutcome::NotOwner);
        }

        let Ok(mut guard) = session.try_lock() else {
            return Dispatch::Busy;
        };

        Dispatch::Handled(guard.apply(actor, action, aggregator).await)
    }
}
