//! Alert domain type
//!
//! A single reported emergency: who reported it, what and where it is, and
//! the static risk assigned when it was created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{AlertId, ReporterId};
use super::risk::RiskLevel;

/// Kind of emergency reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum AlertType {
    Flood,
    Fire,
    Medical,
    StructureCollapse,
    #[default]
    Other,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flood => write!(f, "FLOOD"),
            Self::Fire => write!(f, "FIRE"),
            Self::Medical => write!(f, "MEDICAL"),
            Self::StructureCollapse => write!(f, "STRUCTURE_COLLAPSE"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

impl From<&str> for AlertType {
    /// Unknown kinds fold into `Other`
    fn from(s: &str) -> Self {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "FLOOD" => Self::Flood,
            "FIRE" => Self::Fire,
            "MEDICAL" => Self::Medical,
            "STRUCTURE_COLLAPSE" => Self::StructureCollapse,
            _ => Self::Other,
        }
    }
}

impl From<String> for AlertType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

/// Alert lifecycle status. DISPATCHED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    #[default]
    #[serde(alias = "pending", alias = "Pending")]
    Pending,
    #[serde(alias = "dispatched", alias = "Dispatched")]
    Dispatched,
}

impl AlertStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dispatched)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Dispatched => write!(f, "DISPATCHED"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "DISPATCHED" => Ok(Self::Dispatched),
            _ => Err(format!("Unknown alert status: {}", s)),
        }
    }
}

/// A reported emergency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,

    /// Reporter that raised the alert
    pub reporter_id: ReporterId,

    pub alert_type: AlertType,

    /// Free-text report
    pub details: String,

    /// WGS84 latitude
    pub latitude: f64,

    /// WGS84 longitude
    pub longitude: f64,

    pub status: AlertStatus,

    /// Static risk assigned at creation; never changed by the coordinator
    pub risk_level: Option<RiskLevel>,

    /// Why the static risk was assigned
    pub risk_reason: String,

    /// Feed-assigned creation time
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Create a pending alert with no static risk
    pub fn new(
        id: impl Into<AlertId>,
        reporter_id: impl Into<ReporterId>,
        alert_type: AlertType,
        latitude: f64,
        longitude: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            reporter_id: reporter_id.into(),
            alert_type,
            details: String::new(),
            latitude,
            longitude,
            status: AlertStatus::Pending,
            risk_level: None,
            risk_reason: String::new(),
            created_at,
        }
    }

    /// Set the static risk
    pub fn with_risk(mut self, level: RiskLevel, reason: impl Into<String>) -> Self {
        self.risk_level = Some(level);
        self.risk_reason = reason.into();
        self
    }

    /// Set the free-text details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn is_pending(&self) -> bool {
        self.status == AlertStatus::Pending
    }

    /// Queue rank of the static risk
    pub fn static_rank(&self) -> u8 {
        RiskLevel::rank_of(self.risk_level)
    }
}
