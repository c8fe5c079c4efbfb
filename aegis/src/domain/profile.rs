//! Reporter profiles

use serde::{Deserialize, Serialize};

/// Accessibility needs of a reporter, used by the risk service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum VulnerabilityStatus {
    #[default]
    None,
    Wheelchair,
    VisuallyImpaired,
    Elderly,
}

impl std::fmt::Display for VulnerabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Wheelchair => write!(f, "WHEELCHAIR"),
            Self::VisuallyImpaired => write!(f, "VISUALLY_IMPAIRED"),
            Self::Elderly => write!(f, "ELDERLY"),
        }
    }
}

impl From<String> for VulnerabilityStatus {
    fn from(s: String) -> Self {
        match s.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "WHEELCHAIR" => Self::Wheelchair,
            "VISUALLY_IMPAIRED" => Self::VisuallyImpaired,
            "ELDERLY" => Self::Elderly,
            _ => Self::None,
        }
    }
}

/// Reporter context joined onto each alert
///
/// The default profile (empty name, no vulnerability) stands in for
/// reporters whose profile could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReporterProfile {
    #[serde(rename = "fullName", default)]
    pub display_name: String,

    #[serde(rename = "vulnerability_status", default)]
    pub vulnerability: VulnerabilityStatus,
}

impl ReporterProfile {
    pub fn new(display_name: impl Into<String>, vulnerability: VulnerabilityStatus) -> Self {
        Self {
            display_name: display_name.into(),
            vulnerability,
        }
    }

    /// Name for display, "Unknown" when the profile is empty
    pub fn display_name_or_unknown(&self) -> &str {
        if self.display_name.is_empty() {
            "Unknown"
        } else {
            &self.display_name
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
