//! Triage queue element

use serde::Serialize;

use super::alert::Alert;
use super::id::AlertId;
use super::profile::ReporterProfile;

/// An alert joined with its reporter's profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageEntry {
    pub alert: Alert,
    pub reporter: ReporterProfile,
}

impl TriageEntry {
    pub fn new(alert: Alert, reporter: ReporterProfile) -> Self {
        Self { alert, reporter }
    }

    pub fn id(&self) -> &AlertId {
        &self.alert.id
    }

    /// Ordering rank from the static risk
    pub fn rank(&self) -> u8 {
        self.alert.static_rank()
    }
}
