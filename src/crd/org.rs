//! Org custom resource: the top level of the tenancy hierarchy

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{validate_display_name, HierarchyStatus};

/// Specification for an Org
///
/// Orgs live in the root namespace; each one is given its own Namespace
/// named after the Org, which in turn holds the Org's Spaces.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tenancy.lattice.dev",
    version = "v1alpha1",
    kind = "Org",
    plural = "orgs",
    shortname = "org",
    status = "HierarchyStatus",
    namespaced,
    printcolumn = r#"{"name":"Display Name","type":"string","jsonPath":".spec.displayName"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OrgSpec {
    /// Human-readable name shown to users
    pub display_name: String,
}

impl OrgSpec {
    /// Validate the Org specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_display_name(&self.display_name)
    }
}
