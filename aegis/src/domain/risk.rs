//! Risk levels and live risk assessments

use serde::{Deserialize, Serialize};

/// Risk level reported by the citizen app (static) or the risk service (live)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    /// Assessment could not be produced
    Error,
}

impl RiskLevel {
    /// Queue ordering rank. HIGH=3, MEDIUM=2, LOW=1, ERROR=0.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
            Self::Error => 0,
        }
    }

    /// Rank of an optional level; unset ranks with ERROR
    pub fn rank_of(level: Option<RiskLevel>) -> u8 {
        level.map(RiskLevel::rank).unwrap_or(0)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

impl TryFrom<String> for RiskLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, String> {
        s.parse()
    }
}

/// Live risk computed for the currently selected alert
///
/// Transient: lives only as long as the selection that requested it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRiskAssessment {
    pub level: RiskLevel,
    pub reason: String,
}

impl LiveRiskAssessment {
    pub fn new(level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            level,
            reason: reason.into(),
        }
    }

    /// Assessment standing in for a failed risk request
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            "Risk assessment failed".to_string()
        } else {
            reason
        };
        Self {
            level: RiskLevel::Error,
            reason,
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == RiskLevel::Error
    }
}
