//! Space custom resource: a unit of isolation inside an Org

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{validate_display_name, HierarchyStatus};

/// Specification for a Space
///
/// A Space is created in its parent Org's Namespace. The controller gives it
/// a Namespace of its own, a copy of the registry pull credential and the
/// service accounts the run and build systems use inside it.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tenancy.lattice.dev",
    version = "v1alpha1",
    kind = "Space",
    plural = "spaces",
    shortname = "sp",
    status = "HierarchyStatus",
    namespaced,
    printcolumn = r#"{"name":"Display Name","type":"string","jsonPath":".spec.displayName"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSpec {
    /// Human-readable name shown to users
    pub display_name: String,
}

impl SpaceSpec {
    /// Validate the Space specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_display_name(&self.display_name)
    }
}
