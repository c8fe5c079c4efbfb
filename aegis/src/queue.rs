//! TriageQueue - the ordered set of active alerts
//!
//! Entries are ordered by static risk rank descending, then by first-arrival
//! order ascending. Mutations are buffered: `upsert`/`remove` change
//! membership and content, and `commit` re-sorts once for the whole batch.
//! An entry keeps its arrival position across updates, so an unrelated
//! change never reshuffles ties.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::domain::{AlertId, TriageEntry};

/// A queue mutation produced by the enricher or the dispatch path
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOp {
    Upsert(TriageEntry),
    Remove(AlertId),
}

impl QueueOp {
    pub fn id(&self) -> &AlertId {
        match self {
            QueueOp::Upsert(entry) => entry.id(),
            QueueOp::Remove(id) => id,
        }
    }
}

/// Net effect of one committed batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueChanges {
    pub added: Vec<AlertId>,
    pub updated: Vec<AlertId>,
    pub removed: Vec<AlertId>,
}

impl QueueChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    entry: TriageEntry,
    arrival: u64,
}

#[derive(Debug, Default)]
pub struct TriageQueue {
    slots: HashMap<AlertId, Slot>,

    /// Committed order
    order: Vec<AlertId>,

    next_arrival: u64,

    /// Ids whose content changed since the last commit
    touched: HashSet<AlertId>,
}

impl TriageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. Returns false when nothing changed.
    pub fn upsert(&mut self, entry: TriageEntry) -> bool {
        let id = entry.id().clone();
        match self.slots.get_mut(&id) {
            Some(slot) if slot.entry == entry => {
                debug!(%id, "upsert: unchanged");
                false
            }
            Some(slot) => {
                debug!(%id, "upsert: replacing");
                slot.entry = entry;
                self.touched.insert(id);
                true
            }
            None => {
                debug!(%id, arrival = self.next_arrival, "upsert: new entry");
                self.slots.insert(
                    id.clone(),
                    Slot {
                        entry,
                        arrival: self.next_arrival,
                    },
                );
                self.next_arrival += 1;
                self.touched.insert(id);
                true
            }
        }
    }

    /// Remove an entry. Removing an absent id is a no-op returning false.
    pub fn remove(&mut self, id: &AlertId) -> bool {
        let removed = self.slots.remove(id).is_some();
        if removed {
            debug!(%id, "remove: removed");
            self.touched.remove(id);
        }
        removed
    }

    /// Apply one op
    pub fn apply(&mut self, op: QueueOp) -> bool {
        match op {
            QueueOp::Upsert(entry) => self.upsert(entry),
            QueueOp::Remove(id) => self.remove(&id),
        }
    }

    /// Re-sort once and report the net membership/content changes since the
    /// previous commit
    pub fn commit(&mut self) -> QueueChanges {
        let previous: HashSet<AlertId> = self.order.iter().cloned().collect();

        let removed: Vec<AlertId> = self
            .order
            .iter()
            .filter(|id| !self.slots.contains_key(*id))
            .cloned()
            .collect();

        let mut order: Vec<AlertId> = self.slots.keys().cloned().collect();
        order.sort_by(|a, b| {
            let (sa, sb) = (&self.slots[a], &self.slots[b]);
            sb.entry
                .rank()
                .cmp(&sa.entry.rank())
                .then(sa.arrival.cmp(&sb.arrival))
        });
        self.order = order;

        let mut changes = QueueChanges {
            removed,
            ..Default::default()
        };
        for id in &self.order {
            if !previous.contains(id) {
                changes.added.push(id.clone());
            } else if self.touched.contains(id) {
                changes.updated.push(id.clone());
            }
        }
        self.touched.clear();

        debug!(
            len = self.order.len(),
            added = changes.added.len(),
            updated = changes.updated.len(),
            removed = changes.removed.len(),
            "commit: re-sorted"
        );
        changes
    }

    /// Entries in committed order
    pub fn entries(&self) -> impl Iterator<Item = &TriageEntry> {
        self.order.iter().filter_map(|id| self.slots.get(id).map(|s| &s.entry))
    }

    /// Owned copy of the committed order
    pub fn snapshot(&self) -> Vec<TriageEntry> {
        self.entries().cloned().collect()
    }

    pub fn get(&self, id: &AlertId) -> Option<&TriageEntry> {
        self.slots.get(id).map(|s| &s.entry)
    }

    pub fn contains(&self, id: &AlertId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
