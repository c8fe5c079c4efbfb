//! In-memory record store
//!
//! Implements the profile store, the alert store and the change feed source
//! over plain maps. Used by tests and by `aegis run --demo`. Faults can be
//! injected to exercise the degraded paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use tracing::debug;
use uuid::Uuid;

use super::{AlertStore, ProfileStore, StoreError};
use crate::domain::{
    Alert, AlertId, AlertStatus, AlertType, ReporterId, ReporterProfile, RiskLevel, VulnerabilityStatus,
};
use crate::feed::{ChangeFeedSource, ChangeStream, FeedError, FeedFilter, RawAlertRecord, RawChange};

type FeedSender = UnboundedSender<Result<Vec<RawChange>, FeedError>>;

struct Subscription {
    filter: FeedFilter,
    tx: FeedSender,
}

#[derive(Default)]
struct Inner {
    /// Alerts in insertion order
    alerts: Vec<Alert>,
    profiles: HashMap<ReporterId, ReporterProfile>,
    subscriptions: HashMap<Uuid, Subscription>,

    failing_profiles: HashSet<ReporterId>,
    fail_next_status: Option<String>,
    failing_opens: u32,
    status_delay: Duration,

    profile_lookups: usize,
    status_writes: usize,
}

impl Inner {
    fn position(&self, id: &AlertId) -> Option<usize> {
        self.alerts.iter().position(|a| &a.id == id)
    }

    /// Push changes to every live subscription, dropping closed ones
    fn publish(&mut self, change: impl Fn(&FeedFilter) -> Option<RawChange>) {
        self.subscriptions.retain(|id, sub| match change(&sub.filter) {
            Some(c) => {
                let alive = sub.tx.unbounded_send(Ok(vec![c])).is_ok();
                if !alive {
                    debug!(subscription = %id, "publish: subscription closed");
                }
                alive
            }
            None => true,
        });
    }
}

/// Shared in-memory store; clones share state
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace an alert, notifying live subscriptions
    pub fn insert_alert(&self, alert: Alert) {
        debug!(id = %alert.id, status = %alert.status, "MemoryStore::insert_alert: called");
        let mut inner = self.lock();
        let previous = match inner.position(&alert.id) {
            Some(idx) => Some(std::mem::replace(&mut inner.alerts[idx], alert.clone())),
            None => {
                inner.alerts.push(alert.clone());
                None
            }
        };

        inner.publish(|filter| {
            let was = previous.as_ref().is_some_and(|p| filter.matches(p));
            let is = filter.matches(&alert);
            match (was, is) {
                (false, true) => Some(RawChange::Added(RawAlertRecord::from(&alert))),
                (true, true) => Some(RawChange::Modified(RawAlertRecord::from(&alert))),
                (true, false) => Some(RawChange::Removed(alert.id.clone())),
                (false, false) => None,
            }
        });
    }

    /// Delete an alert record
    pub fn delete_alert(&self, id: &AlertId) {
        debug!(%id, "MemoryStore::delete_alert: called");
        let mut inner = self.lock();
        if let Some(idx) = inner.position(id) {
            let removed = inner.alerts.remove(idx);
            inner.publish(|filter| filter.matches(&removed).then(|| RawChange::Removed(removed.id.clone())));
        }
    }

    /// Deliver raw changes to live subscriptions without touching stored
    /// records, e.g. to replay an old ADD
    pub fn inject(&self, changes: Vec<RawChange>) {
        debug!(changes = changes.len(), "MemoryStore::inject: called");
        let mut inner = self.lock();
        inner
            .subscriptions
            .retain(|_, sub| sub.tx.unbounded_send(Ok(changes.clone())).is_ok());
    }

    pub fn alert(&self, id: &AlertId) -> Option<Alert> {
        let inner = self.lock();
        inner.position(id).map(|idx| inner.alerts[idx].clone())
    }

    pub fn put_profile(&self, reporter_id: impl Into<ReporterId>, profile: ReporterProfile) {
        self.lock().profiles.insert(reporter_id.into(), profile);
    }

    /// Make lookups for this reporter fail until cleared
    pub fn fail_profile_lookups(&self, reporter_id: impl Into<ReporterId>) {
        self.lock().failing_profiles.insert(reporter_id.into());
    }

    pub fn clear_profile_failures(&self) {
        self.lock().failing_profiles.clear();
    }

    /// Make the next status write fail with the given message
    pub fn fail_next_status_write(&self, message: impl Into<String>) {
        self.lock().fail_next_status = Some(message.into());
    }

    /// Delay every status write, to observe the staged state
    pub fn set_status_delay(&self, delay: Duration) {
        self.lock().status_delay = delay;
    }

    /// Make the next `count` feed opens fail
    pub fn fail_next_opens(&self, count: u32) {
        self.lock().failing_opens = count;
    }

    /// End every live subscription, as a connectivity loss would
    pub fn disconnect_feeds(&self) {
        debug!("MemoryStore::disconnect_feeds: called");
        self.lock().subscriptions.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    pub fn profile_lookups(&self) -> usize {
        self.lock().profile_lookups
    }

    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }

    /// A store seeded with a handful of pending alerts around Chennai
    pub fn demo() -> Self {
        let store = Self::new();
        let now = Utc::now();
        let reporters = [
            ("u-priya", "Priya Raman", VulnerabilityStatus::Wheelchair),
            ("u-arjun", "Arjun Kumar", VulnerabilityStatus::None),
            ("u-meena", "Meena Iyer", VulnerabilityStatus::Elderly),
        ];
        for (id, name, vulnerability) in reporters {
            store.put_profile(id, ReporterProfile::new(name, vulnerability));
        }

        let (high, medium, low) = (Some(RiskLevel::High), Some(RiskLevel::Medium), Some(RiskLevel::Low));
        let alerts = [
            ("demo-0001", "u-priya", AlertType::Flood, 13.0418, 80.2341, high, "Water rising in ground floor"),
            ("demo-0002", "u-arjun", AlertType::Fire, 13.0827, 80.2707, medium, "Smoke from warehouse"),
            ("demo-0003", "u-meena", AlertType::Medical, 13.0067, 80.2206, high, "Breathing difficulty"),
            ("demo-0004", "u-unknown", AlertType::StructureCollapse, 13.1143, 80.2329, None, "Wall collapsed in rain"),
            ("demo-0005", "u-arjun", AlertType::Other, 13.0500, 80.2824, low, "Fallen tree blocking road"),
        ];
        for (i, (id, reporter, kind, lat, lon, level, details)) in alerts.into_iter().enumerate() {
            let created_at = now - chrono::Duration::minutes(10 - i as i64);
            let mut alert = Alert::new(id, reporter, kind, lat, lon, created_at).with_details(details);
            if let Some(level) = level {
                alert = alert.with_risk(level, "Assessed at report time");
            }
            store.insert_alert(alert);
        }
        store
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, reporter_id: &ReporterId) -> Result<Option<ReporterProfile>, StoreError> {
        debug!(%reporter_id, "MemoryStore::get_profile: called");
        let mut inner = self.lock();
        inner.profile_lookups += 1;
        if inner.failing_profiles.contains(reporter_id) {
            return Err(StoreError::Unavailable(format!("profile lookup failed for {}", reporter_id)));
        }
        Ok(inner.profiles.get(reporter_id).cloned())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn set_status(&self, alert_id: &AlertId, status: AlertStatus) -> Result<(), StoreError> {
        debug!(%alert_id, %status, "MemoryStore::set_status: called");
        let delay = self.lock().status_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let current = {
            let mut inner = self.lock();
            inner.status_writes += 1;
            if let Some(message) = inner.fail_next_status.take() {
                debug!(%alert_id, "set_status: injected failure");
                return Err(StoreError::Unavailable(message));
            }
            inner
                .position(alert_id)
                .map(|idx| inner.alerts[idx].clone())
                .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))?
        };

        if current.status == status {
            debug!(%alert_id, "set_status: already in state");
            return Ok(());
        }
        self.insert_alert(Alert { status, ..current });
        Ok(())
    }
}

#[async_trait]
impl ChangeFeedSource for MemoryStore {
    async fn open(&self, filter: &FeedFilter) -> Result<ChangeStream, FeedError> {
        debug!(?filter, "MemoryStore::open: called");
        let mut inner = self.lock();
        if inner.failing_opens > 0 {
            inner.failing_opens -= 1;
            return Err(FeedError::Connect("injected connect failure".to_string()));
        }

        let (tx, rx) = unbounded();
        let snapshot: Vec<RawChange> = inner
            .alerts
            .iter()
            .filter(|a| filter.matches(a))
            .map(|a| RawChange::Added(RawAlertRecord::from(a)))
            .collect();
        tx.unbounded_send(Ok(snapshot))
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        let id = Uuid::now_v7();
        debug!(subscription = %id, "open: subscribed");
        inner.subscriptions.insert(id, Subscription { filter: *filter, tx });
        Ok(rx.boxed())
    }
}
