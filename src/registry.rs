//! Kind registry for the objects the tenancy controllers touch
//!
//! Built once at startup and injected into every store adapter via
//! `Arc<KindRegistry>`. Built-in kinds come straight from `k8s-openapi`;
//! the hierarchy CRDs are resolved through API discovery so a cluster
//! serving a different version of the group is still addressed correctly.

use std::fmt;

use dashmap::DashMap;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use kube::api::{Api, DynamicObject};
use kube::discovery::{ApiResource, Discovery};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::crd::{Org, Space};
use crate::Error;

/// Closed set of object kinds handled by the controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Org hierarchy resource (tenancy.lattice.dev)
    Org,
    /// Space hierarchy resource (tenancy.lattice.dev)
    Space,
    /// Namespace used as a boundary
    Namespace,
    /// Registry credential Secret
    Secret,
    /// Service identity
    ServiceAccount,
}

/// All ObjectKind variants for iteration.
pub const ALL_OBJECT_KINDS: &[ObjectKind] = &[
    ObjectKind::Org,
    ObjectKind::Space,
    ObjectKind::Namespace,
    ObjectKind::Secret,
    ObjectKind::ServiceAccount,
];

impl ObjectKind {
    /// Kubernetes Kind string
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Org => "Org",
            Self::Space => "Space",
            Self::Namespace => "Namespace",
            Self::Secret => "Secret",
            Self::ServiceAccount => "ServiceAccount",
        }
    }

    /// Whether the kind is one of our CRDs and needs discovery
    fn is_custom(&self) -> bool {
        matches!(self, Self::Org | Self::Space)
    }

    /// Whether objects of this kind live inside a namespace
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, Self::Namespace)
    }

    /// API resource compiled into this binary
    fn compiled(&self) -> ApiResource {
        match self {
            Self::Org => ApiResource::erase::<Org>(&()),
            Self::Space => ApiResource::erase::<Space>(&()),
            Self::Namespace => ApiResource::erase::<Namespace>(&()),
            Self::Secret => ApiResource::erase::<Secret>(&()),
            Self::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_str())
    }
}

/// Resolves [`ObjectKind`]s to API resources.
///
/// Uses `DashMap` so lookups from concurrent reconciles never contend.
pub struct KindRegistry {
    entries: DashMap<ObjectKind, ApiResource>,
}

impl KindRegistry {
    /// Registry populated only from compiled-in types.
    ///
    /// Used when discovery is unavailable, and in tests.
    pub fn builtin() -> Self {
        let entries = DashMap::new();
        for kind in ALL_OBJECT_KINDS {
            entries.insert(*kind, kind.compiled());
        }
        Self { entries }
    }

    /// Run API discovery once and prefer the served versions of our CRDs.
    ///
    /// Falls back to the compiled versions when discovery fails or the
    /// group is not served yet.
    pub async fn discover(client: Client) -> Self {
        let registry = Self::builtin();

        let discovery = match Discovery::new(client).run().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "API discovery failed, using compiled kind versions");
                return registry;
            }
        };

        for kind in ALL_OBJECT_KINDS.iter().filter(|k| k.is_custom()) {
            let compiled = kind.compiled();
            let served = discovery
                .groups()
                .filter(|g| g.name() == compiled.group)
                .flat_map(|g| g.resources_by_stability())
                .map(|(ar, _caps)| ar)
                .find(|ar| ar.kind == compiled.kind);

            match served {
                Some(ar) => {
                    info!(kind = %kind, api_version = %ar.api_version, "discovered hierarchy kind");
                    registry.entries.insert(*kind, ar);
                }
                None => warn!(kind = %kind, "kind not served yet, using compiled version"),
            }
        }

        registry
    }

    /// Look up the API resource for a kind.
    pub fn resolve(&self, kind: ObjectKind) -> Result<ApiResource, Error> {
        self.entries
            .get(&kind)
            .map(|ar| ar.clone())
            .ok_or_else(|| Error::internal(format!("kind {kind} missing from registry")))
    }

    /// Dynamic API handle for a kind, scoped to `namespace` when the kind is namespaced.
    pub fn api(
        &self,
        client: &Client,
        kind: ObjectKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, Error> {
        let ar = self.resolve(kind)?;
        match (kind.is_namespaced(), namespace) {
            (true, Some(ns)) => Ok(Api::namespaced_with(client.clone(), ns, &ar)),
            (true, None) => Err(Error::internal(format!(
                "{kind} is namespaced but no namespace was given"
            ))),
            (false, _) => Ok(Api::all_with(client.clone(), &ar)),
        }
    }
}

/// Convert a typed object into the dynamic form used by the store adapters.
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, Error> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Convert a dynamic object back into its typed form.
pub fn from_dynamic<K: Resource + DeserializeOwned>(obj: DynamicObject) -> Result<K, Error> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}
