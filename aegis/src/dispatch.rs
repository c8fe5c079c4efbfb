//! DispatchCoordinator - the PENDING -> DISPATCHED state machine
//!
//! Each dispatch is an explicit staged/committed pair:
//!
//! - `stage` marks the alert as in flight. It stays in the queue.
//! - `commit` runs after the store confirms. It removes the alert from the
//!   queue and records it as dispatched for the rest of the session.
//! - `rollback` runs after the store rejects. It clears the staged marker
//!   and the alert stays PENDING and visible.
//!
//! Committed ids are remembered so a replayed ADD for a dispatched alert can
//! be refused before it reaches the queue.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::AlertId;
use crate::queue::{QueueOp, TriageQueue};

/// Why a dispatch request was a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchConflict {
    /// The alert was already dispatched this session
    AlreadyDispatched,

    /// A dispatch for the alert is awaiting the store
    InFlight,

    /// The alert is not in the queue or no longer exists in the store
    Vanished,
}

impl std::fmt::Display for DispatchConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyDispatched => write!(f, "already dispatched"),
            Self::InFlight => write!(f, "dispatch in flight"),
            Self::Vanished => write!(f, "alert no longer active"),
        }
    }
}

/// Result of a resolved dispatch request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchOutcome {
    Dispatched,
    Conflict(DispatchConflict),
}

/// A dispatch that could not be completed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatch of {id} failed: {message}")]
    Store {
        id: AlertId,
        message: String,
        retryable: bool,
    },

    #[error("Alert {id} no longer exists in the store")]
    NotFound { id: AlertId },

    #[error("Coordinator channel closed")]
    ChannelClosed,
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Store { retryable, .. } => *retryable,
            DispatchError::NotFound { .. } => false,
            DispatchError::ChannelClosed => false,
        }
    }
}

/// Identifies one staged dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTicket {
    pub id: AlertId,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct DispatchCoordinator {
    staged: HashMap<AlertId, u64>,
    committed: HashSet<AlertId>,
    next_seq: u64,
}

impl DispatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a dispatch, or report why it is a no-op
    pub fn stage(&mut self, id: &AlertId, queue: &TriageQueue) -> Result<DispatchTicket, DispatchConflict> {
        if self.committed.contains(id) {
            debug!(%id, "stage: already dispatched");
            return Err(DispatchConflict::AlreadyDispatched);
        }
        if self.staged.contains_key(id) {
            debug!(%id, "stage: in flight");
            return Err(DispatchConflict::InFlight);
        }
        if !queue.contains(id) {
            debug!(%id, "stage: not in queue");
            return Err(DispatchConflict::Vanished);
        }

        self.next_seq += 1;
        self.staged.insert(id.clone(), self.next_seq);
        debug!(%id, seq = self.next_seq, "stage: staged");
        Ok(DispatchTicket {
            id: id.clone(),
            seq: self.next_seq,
        })
    }

    /// Store confirmed the write: remove the entry and remember the id
    ///
    /// Returns false if the ticket is not the one currently staged.
    pub fn commit(&mut self, ticket: &DispatchTicket, queue: &mut TriageQueue) -> bool {
        if self.staged.get(&ticket.id) != Some(&ticket.seq) {
            debug!(id = %ticket.id, seq = ticket.seq, "commit: unknown ticket");
            return false;
        }
        self.staged.remove(&ticket.id);
        self.committed.insert(ticket.id.clone());
        queue.remove(&ticket.id);
        debug!(id = %ticket.id, "commit: dispatched");
        true
    }

    /// Store rejected the write: clear the staged marker
    pub fn rollback(&mut self, ticket: &DispatchTicket) -> bool {
        if self.staged.get(&ticket.id) != Some(&ticket.seq) {
            debug!(id = %ticket.id, seq = ticket.seq, "rollback: unknown ticket");
            return false;
        }
        self.staged.remove(&ticket.id);
        debug!(id = %ticket.id, "rollback: reverted");
        true
    }

    /// Whether a feed op may reach the queue. Upserts of dispatched ids are refused.
    pub fn admits(&self, op: &QueueOp) -> bool {
        match op {
            QueueOp::Upsert(entry) if self.committed.contains(entry.id()) => {
                debug!(id = %entry.id(), "admits: refusing replay of dispatched alert");
                false
            }
            _ => true,
        }
    }

    pub fn is_staged(&self, id: &AlertId) -> bool {
        self.staged.contains_key(id)
    }

    pub fn is_committed(&self, id: &AlertId) -> bool {
        self.committed.contains(id)
    }

    /// Ids with a dispatch awaiting the store, sorted
    pub fn staged_ids(&self) -> Vec<AlertId> {
        let mut ids: Vec<AlertId> = self.staged.keys().cloned().collect();
        ids.sort();
        ids
    }
}
