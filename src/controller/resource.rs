//! Per-level behaviour shared by the generic reconciler

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crd::{validate_dns_label, HierarchyStatus, Org, Space};
use crate::registry::ObjectKind;
use crate::Error;

/// Service identities a boundary may need, one per downstream system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityRole {
    /// Identity the run system starts application workloads with
    AppRunner,
    /// Identity the build system pushes and pulls images with
    ImageBuilder,
}

impl IdentityRole {
    /// ServiceAccount name inside the boundary
    pub fn account_name(&self) -> &'static str {
        match self {
            Self::AppRunner => "app-runner",
            Self::ImageBuilder => "image-builder",
        }
    }

    /// Value of the identity role label
    pub fn system(&self) -> &'static str {
        match self {
            Self::AppRunner => "run",
            Self::ImageBuilder => "build",
        }
    }
}

/// A node of the tenancy tree that owns a boundary.
///
/// Implemented once per level; the reconciler is generic over it.
pub trait HierarchyResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Registry kind for store lookups
    const OBJECT_KIND: ObjectKind;

    /// Label on the boundary pointing back at the owner
    const GUID_LABEL: &'static str;

    /// Identities provisioned in this level's boundary
    const REQUIRED_IDENTITIES: &'static [IdentityRole];

    /// Human-readable name
    fn display_name(&self) -> &str;

    /// Current status, if any has been written
    fn hierarchy_status(&self) -> Option<&HierarchyStatus>;

    /// Replace the status
    fn set_hierarchy_status(&mut self, status: HierarchyStatus);

    /// Validate the spec fields
    fn validate_spec(&self) -> Result<(), Error>;
}

impl HierarchyResource for Org {
    const OBJECT_KIND: ObjectKind = ObjectKind::Org;
    const GUID_LABEL: &'static str = "tenancy.lattice.dev/org-guid";
    const REQUIRED_IDENTITIES: &'static [IdentityRole] = &[];

    fn display_name(&self) -> &str {
        &self.spec.display_name
    }

    fn hierarchy_status(&self) -> Option<&HierarchyStatus> {
        self.status.as_ref()
    }

    fn set_hierarchy_status(&mut self, status: HierarchyStatus) {
        self.status = Some(status);
    }

    fn validate_spec(&self) -> Result<(), Error> {
        self.spec.validate()
    }
}

impl HierarchyResource for Space {
    const OBJECT_KIND: ObjectKind = ObjectKind::Space;
    const GUID_LABEL: &'static str = "tenancy.lattice.dev/space-guid";
    const REQUIRED_IDENTITIES: &'static [IdentityRole] =
        &[IdentityRole::AppRunner, IdentityRole::ImageBuilder];

    fn display_name(&self) -> &str {
        &self.spec.display_name
    }

    fn hierarchy_status(&self) -> Option<&HierarchyStatus> {
        self.status.as_ref()
    }

    fn set_hierarchy_status(&mut self, status: HierarchyStatus) {
        self.status = Some(status);
    }

    fn validate_spec(&self) -> Result<(), Error> {
        self.spec.validate()
    }
}

/// Namespace the resource lives in: the source of its registry credential.
pub fn parent_scope<R: HierarchyResource>(resource: &R) -> Result<String, Error> {
    resource.namespace().ok_or_else(|| {
        Error::configuration(format!(
            "{} {} has no namespace",
            R::OBJECT_KIND,
            resource.name_any()
        ))
    })
}

/// Reject resources whose fields cannot be turned into a boundary.
pub fn validate<R: HierarchyResource>(resource: &R) -> Result<(), Error> {
    validate_dns_label("metadata.name", &resource.name_any())?;
    parent_scope(resource)?;
    resource.validate_spec()
}
