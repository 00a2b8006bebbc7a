//! Readiness condition management
//!
//! Everything here is pure: the reconciler asks for the status it wants and
//! gets back either the new status to persist or `None` when nothing
//! material would change, so a pass writes status at most once per step and
//! never for a no-op.

use crate::crd::{Condition, ConditionStatus, HierarchyStatus};

/// Condition type reflecting aggregate provisioning state
pub const READY: &str = "Ready";

/// Reasons recorded on the Ready condition
pub mod reasons {
    /// A pass has started for the current generation
    pub const RECONCILING: &str = "Reconciling";
    /// The boundary exists but is not active yet
    pub const BOUNDARY_PENDING: &str = "BoundaryPending";
    /// Boundary, credential and identities are in place
    pub const PROVISIONED: &str = "Provisioned";
    /// Required fields are malformed
    pub const INVALID_SPEC: &str = "InvalidSpec";
    /// A pass failed after the resource had been provisioned
    pub const PROVISIONING_FAILED: &str = "ProvisioningFailed";
}

/// Ready=Unknown, written when a pass starts
pub fn reconciling() -> Condition {
    Condition::new(
        READY,
        ConditionStatus::Unknown,
        reasons::RECONCILING,
        "reconciliation in progress",
    )
}

/// Ready=Unknown while the boundary initializes
pub fn boundary_pending(boundary: &str) -> Condition {
    Condition::new(
        READY,
        ConditionStatus::Unknown,
        reasons::BOUNDARY_PENDING,
        format!("waiting for namespace {boundary} to become active"),
    )
}

/// Ready=True
pub fn provisioned() -> Condition {
    Condition::new(
        READY,
        ConditionStatus::True,
        reasons::PROVISIONED,
        "boundary provisioned",
    )
}

/// Ready=False for malformed input
pub fn invalid_spec(message: impl Into<String>) -> Condition {
    Condition::new(READY, ConditionStatus::False, reasons::INVALID_SPEC, message)
}

/// Ready=Unknown when a pass fails on a previously ready resource
pub fn provisioning_failed(message: impl Into<String>) -> Condition {
    Condition::new(
        READY,
        ConditionStatus::Unknown,
        reasons::PROVISIONING_FAILED,
        message,
    )
}

/// Replace the condition of the same type, keeping at most one per type.
///
/// Returns whether anything material changed. The transition time is only
/// taken from `desired` when the status value itself flips.
pub fn set_condition(conditions: &mut Vec<Condition>, desired: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == desired.type_) {
        Some(existing) if existing.same_state(&desired) => false,
        Some(existing) => {
            let transition = if existing.status == desired.status {
                existing.last_transition_time
            } else {
                desired.last_transition_time
            };
            *existing = Condition {
                last_transition_time: transition,
                ..desired
            };
            true
        }
        None => {
            conditions.push(desired);
            true
        }
    }
}

/// Whether the start of reconciliation is already visible on the object:
/// a Ready condition exists and was computed for the current generation.
pub fn start_reflected(status: Option<&HierarchyStatus>, generation: Option<i64>) -> bool {
    status.is_some_and(|s| s.condition(READY).is_some() && s.observed_generation == generation)
}

/// Whether Ready is currently True
pub fn is_ready(status: Option<&HierarchyStatus>) -> bool {
    status
        .and_then(|s| s.condition(READY))
        .is_some_and(|c| c.status == ConditionStatus::True)
}

/// Compute the status to persist, or `None` if it would not change.
///
/// `guid` is echoed into the status when given; otherwise the current value
/// is kept.
pub fn next_status(
    current: Option<&HierarchyStatus>,
    generation: Option<i64>,
    guid: Option<&str>,
    desired: Condition,
) -> Option<HierarchyStatus> {
    let mut status = current.cloned().unwrap_or_default();
    let mut changed = set_condition(&mut status.conditions, desired);

    if let Some(guid) = guid {
        if status.guid != guid {
            status.guid = guid.to_string();
            changed = true;
        }
    }
    if status.observed_generation != generation {
        status.observed_generation = generation;
        changed = true;
    }

    changed.then_some(status)
}
