//! Boundary provisioning
//!
//! A boundary is the Namespace named after its owning hierarchy resource.
//! Its own teardown is asynchronous (the namespace controller drains it), so
//! this module only ever *requests* deletion.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::resource::{parent_scope, HierarchyResource};
use crate::registry::{from_dynamic, to_dynamic, KindRegistry, ObjectKind};
use crate::{
    Error, DISPLAY_NAME_ANNOTATION, FIELD_MANAGER, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    PARENT_NAMESPACE_LABEL, POD_SECURITY_ENFORCE_LABEL, POD_SECURITY_LEVEL,
};

/// Phase value of a Namespace that is ready for use
const NAMESPACE_ACTIVE: &str = "Active";

/// Access to boundary Namespaces
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BoundaryStore: Send + Sync {
    /// Fetch a namespace; `None` when it does not exist
    async fn get(&self, name: &str) -> Result<Option<Namespace>, Error>;

    /// Create a namespace
    async fn create(&self, namespace: &Namespace) -> Result<Namespace, Error>;

    /// Merge the given labels and annotations into an existing namespace
    async fn patch_metadata(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Namespace, Error>;

    /// Request deletion of a namespace
    async fn delete(&self, name: &str) -> Result<(), Error>;
}

/// [`BoundaryStore`] backed by the API server
pub struct KubeBoundaryStore {
    client: Client,
    registry: Arc<KindRegistry>,
}

impl KubeBoundaryStore {
    /// Create a store resolving its API through `registry`
    pub fn new(client: Client, registry: Arc<KindRegistry>) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl BoundaryStore for KubeBoundaryStore {
    async fn get(&self, name: &str) -> Result<Option<Namespace>, Error> {
        let api = self.registry.api(&self.client, ObjectKind::Namespace, None)?;
        match api.get_opt(name).await {
            Ok(obj) => obj.map(from_dynamic::<Namespace>).transpose(),
            Err(e) => Err(Error::from_api(ObjectKind::Namespace, name, e)),
        }
    }

    async fn create(&self, namespace: &Namespace) -> Result<Namespace, Error> {
        let name = namespace.name_any();
        let api = self.registry.api(&self.client, ObjectKind::Namespace, None)?;
        let obj = api
            .create(&PostParams::default(), &to_dynamic(namespace)?)
            .await
            .map_err(|e| Error::from_api(ObjectKind::Namespace, &name, e))?;
        from_dynamic(obj)
    }

    async fn patch_metadata(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Namespace, Error> {
        let api = self.registry.api(&self.client, ObjectKind::Namespace, None)?;
        let patch = json!({ "metadata": { "labels": labels, "annotations": annotations } });
        let obj = api
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_api(ObjectKind::Namespace, name, e))?;
        from_dynamic(obj)
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        let api = self.registry.api(&self.client, ObjectKind::Namespace, None)?;
        api.delete(name, &DeleteParams::background())
            .await
            .map_err(|e| Error::from_api(ObjectKind::Namespace, name, e))?;
        Ok(())
    }
}

/// Outcome of [`BoundaryProvisioner::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryState {
    /// The namespace is active and can hold dependents
    Active,
    /// The namespace exists (or is being created) but is not usable yet
    Pending,
}

/// The Namespace a resource should own
pub fn desired_boundary<R: HierarchyResource>(resource: &R) -> Result<Namespace, Error> {
    let labels = BTreeMap::from([
        (R::GUID_LABEL.to_string(), resource.name_any()),
        (PARENT_NAMESPACE_LABEL.to_string(), parent_scope(resource)?),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (
            POD_SECURITY_ENFORCE_LABEL.to_string(),
            POD_SECURITY_LEVEL.to_string(),
        ),
    ]);
    let annotations = BTreeMap::from([(
        DISPLAY_NAME_ANNOTATION.to_string(),
        resource.display_name().to_string(),
    )]);

    Ok(Namespace {
        metadata: ObjectMeta {
            name: Some(resource.name_any()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Whether the namespace controller has finished initializing `ns`
pub fn is_active(ns: &Namespace) -> bool {
    ns.status.as_ref().and_then(|s| s.phase.as_deref()) == Some(NAMESPACE_ACTIVE)
}

/// Entries of `desired` missing from or different in `current`
fn missing_entries(
    current: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    desired
        .into_iter()
        .flatten()
        .filter(|(k, v)| current.and_then(|c| c.get(*k)) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Labels and annotations that need restoring, or `None` when nothing drifted
pub fn metadata_drift(
    current: &Namespace,
    desired: &Namespace,
) -> Option<(BTreeMap<String, String>, BTreeMap<String, String>)> {
    let labels = missing_entries(
        current.metadata.labels.as_ref(),
        desired.metadata.labels.as_ref(),
    );
    let annotations = missing_entries(
        current.metadata.annotations.as_ref(),
        desired.metadata.annotations.as_ref(),
    );
    if labels.is_empty() && annotations.is_empty() {
        None
    } else {
        Some((labels, annotations))
    }
}

/// Ensures one boundary exists per hierarchy resource
pub struct BoundaryProvisioner {
    store: Arc<dyn BoundaryStore>,
}

impl BoundaryProvisioner {
    /// Create a provisioner over `store`
    pub fn new(store: Arc<dyn BoundaryStore>) -> Self {
        Self { store }
    }

    /// Make sure the boundary for `resource` exists and report whether it is usable.
    ///
    /// A create that loses a race to another writer counts as success; the
    /// next pass will observe the namespace's phase.
    pub async fn ensure<R: HierarchyResource>(&self, resource: &R) -> Result<BoundaryState, Error> {
        let desired = desired_boundary(resource)?;
        let name = desired.name_any();

        let current = match self.store.get(&name).await? {
            Some(existing) => match metadata_drift(&existing, &desired) {
                Some((labels, annotations)) => {
                    info!(namespace = %name, "restoring boundary labels");
                    self.store.patch_metadata(&name, &labels, &annotations).await?
                }
                None => existing,
            },
            None => match self.store.create(&desired).await {
                Ok(created) => {
                    info!(namespace = %name, "created boundary namespace");
                    created
                }
                Err(e) if e.is_already_exists() => {
                    debug!(namespace = %name, "boundary created concurrently");
                    return Ok(BoundaryState::Pending);
                }
                Err(e) => return Err(e),
            },
        };

        if is_active(&current) {
            Ok(BoundaryState::Active)
        } else {
            debug!(namespace = %name, "boundary not active yet");
            Ok(BoundaryState::Pending)
        }
    }

    /// Request deletion of the boundary; a boundary that is already gone is fine.
    pub async fn teardown(&self, name: &str) -> Result<(), Error> {
        match self.store.delete(name).await {
            Ok(()) => {
                info!(namespace = %name, "requested boundary deletion");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(namespace = %name, "boundary already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
