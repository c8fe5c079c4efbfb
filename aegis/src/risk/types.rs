//! Request/response types for the risk and briefing service
//!
//! Field names match the service's JSON schema.

use serde::{Deserialize, Serialize};

use crate::domain::{LiveRiskAssessment, ReporterProfile, RiskLevel, TriageEntry, VulnerabilityStatus};

/// Live risk request, keyed on location and reporter vulnerability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRequest {
    pub lat: f64,
    pub lon: f64,
    pub vulnerability_status: VulnerabilityStatus,
}

impl RiskRequest {
    pub fn for_entry(entry: &TriageEntry) -> Self {
        Self {
            lat: entry.alert.latitude,
            lon: entry.alert.longitude,
            vulnerability_status: entry.reporter.vulnerability,
        }
    }
}

/// Risk service response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResponse {
    pub risk_level: RiskLevel,
    pub risk_reason: String,
}

impl From<RiskResponse> for LiveRiskAssessment {
    fn from(r: RiskResponse) -> Self {
        LiveRiskAssessment::new(r.risk_level, r.risk_reason)
    }
}

/// Live risk as nested in a briefing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveRiskPayload {
    pub risk_level: RiskLevel,
    pub risk_reason: String,
}

impl From<&LiveRiskAssessment> for LiveRiskPayload {
    fn from(a: &LiveRiskAssessment) -> Self {
        Self {
            risk_level: a.level,
            risk_reason: a.reason.clone(),
        }
    }
}

/// Briefing request: full alert snapshot, static risk, reporter profile and
/// the nested live risk object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefingRequest {
    pub id: String,
    pub alert_type: String,
    pub details: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,

    /// Static risk level, "UNSET" when the alert carries none
    pub risk_level: String,

    /// Static risk reason
    pub risk_reason: String,

    /// Reporter profile
    pub user: ReporterProfile,

    /// Live risk computed for the current selection, if it has resolved
    pub live_ml_risk: Option<LiveRiskPayload>,

    /// RFC 3339 creation time
    pub created_at: String,
}

impl BriefingRequest {
    pub fn new(entry: &TriageEntry, live_risk: Option<&LiveRiskAssessment>) -> Self {
        let alert = &entry.alert;
        Self {
            id: alert.id.to_string(),
            alert_type: alert.alert_type.to_string(),
            details: alert.details.clone(),
            latitude: alert.latitude,
            longitude: alert.longitude,
            status: alert.status.to_string(),
            risk_level: alert
                .risk_level
                .map(|l| l.to_string())
                .unwrap_or_else(|| "UNSET".to_string()),
            risk_reason: alert.risk_reason.clone(),
            user: entry.reporter.clone(),
            live_ml_risk: live_risk.map(LiveRiskPayload::from),
            created_at: alert.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BriefingResponse {
    pub briefing: String,
}

/// Standard operating procedure lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SopRequest {
    pub query: String,
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SopResponse {
    pub sop: String,
}
