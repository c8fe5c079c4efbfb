//! Domain types for Aegis
//!
//! Alerts, reporter profiles, risk levels and the enriched queue entry.
//! These are plain data; the coordinator decides who may change what.

mod alert;
mod entry;
mod id;
mod profile;
mod risk;

pub use alert::{Alert, AlertStatus, AlertType};
pub use entry::TriageEntry;
pub use id::{AlertId, ReporterId};
pub use profile::{ReporterProfile, VulnerabilityStatus};
pub use risk::{LiveRiskAssessment, RiskLevel};
