//! Shared types for the hierarchy CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum length of a DNS-1123 label
const DNS_LABEL_MAX_LEN: usize = 63;

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Same status, reason and message; the timestamp is ignored
    pub fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Status shared by every hierarchy level
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyStatus {
    /// Echo of the resource identifier, empty until provisioning completes
    #[serde(default)]
    pub guid: String,

    /// Generation the conditions were computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// At most one condition per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl HierarchyStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// Check that `value` is a valid DNS-1123 label.
///
/// Boundary names are taken verbatim from resource names, so anything the
/// API server would reject for a Namespace is rejected here first.
pub fn validate_dns_label(field: &str, value: &str) -> Result<(), crate::Error> {
    if value.is_empty() {
        return Err(crate::Error::configuration(format!("{field} must not be empty")));
    }
    if value.len() > DNS_LABEL_MAX_LEN {
        return Err(crate::Error::configuration(format!(
            "{field} '{value}' exceeds {DNS_LABEL_MAX_LEN} characters"
        )));
    }
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let alnum_ends = value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !valid_chars || !alnum_ends {
        return Err(crate::Error::configuration(format!(
            "{field} '{value}' is not a valid DNS-1123 label"
        )));
    }
    Ok(())
}

/// Check a human display name: non-empty and not just whitespace.
pub fn validate_display_name(value: &str) -> Result<(), crate::Error> {
    if value.trim().is_empty() {
        return Err(crate::Error::configuration("displayName must not be empty"));
    }
    Ok(())
}
