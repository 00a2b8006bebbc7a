//! Store for the hierarchy resources themselves

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;

use super::finalizer::{finalizer_patch, with_finalizer, without_finalizer};
use super::resource::HierarchyResource;
use crate::crd::HierarchyStatus;
use crate::registry::{from_dynamic, KindRegistry};
use crate::{Error, FIELD_MANAGER};

/// Read and write access to hierarchy resources of one level.
///
/// Every write is guarded by the resourceVersion of the object passed in and
/// returns the object as stored afterwards, so consecutive writes in one pass
/// chain on fresh versions.
#[async_trait]
pub trait HierarchyStore<R: HierarchyResource>: Send + Sync {
    /// Fetch a resource; `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<R>, Error>;

    /// Add the finalizer
    async fn add_finalizer(&self, resource: &R) -> Result<R, Error>;

    /// Remove the finalizer
    async fn remove_finalizer(&self, resource: &R) -> Result<(), Error>;

    /// Replace the status subresource
    async fn update_status(&self, resource: &R, status: &HierarchyStatus) -> Result<R, Error>;
}

/// [`HierarchyStore`] backed by the API server
pub struct KubeHierarchyStore<R> {
    client: Client,
    registry: Arc<KindRegistry>,
    _kind: PhantomData<fn() -> R>,
}

impl<R: HierarchyResource> KubeHierarchyStore<R> {
    /// Create a store resolving its API through `registry`
    pub fn new(client: Client, registry: Arc<KindRegistry>) -> Self {
        Self {
            client,
            registry,
            _kind: PhantomData,
        }
    }

    fn namespace_of(resource: &R) -> Result<String, Error> {
        resource
            .namespace()
            .ok_or_else(|| Error::internal(format!("{} without namespace", R::OBJECT_KIND)))
    }
}

#[async_trait]
impl<R: HierarchyResource> HierarchyStore<R> for KubeHierarchyStore<R> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<R>, Error> {
        let api = self.registry.api(&self.client, R::OBJECT_KIND, Some(namespace))?;
        match api.get_opt(name).await {
            Ok(Some(obj)) => Ok(Some(from_dynamic(obj)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::from_api(R::OBJECT_KIND, name, e)),
        }
    }

    async fn add_finalizer(&self, resource: &R) -> Result<R, Error> {
        let name = resource.name_any();
        let api = self
            .registry
            .api(&self.client, R::OBJECT_KIND, Some(&Self::namespace_of(resource)?))?;
        let patch = finalizer_patch(resource.meta(), with_finalizer(resource.meta()));

        let obj = api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_api(R::OBJECT_KIND, &name, e))?;
        from_dynamic(obj)
    }

    async fn remove_finalizer(&self, resource: &R) -> Result<(), Error> {
        let name = resource.name_any();
        let api = self
            .registry
            .api(&self.client, R::OBJECT_KIND, Some(&Self::namespace_of(resource)?))?;
        let patch = finalizer_patch(resource.meta(), without_finalizer(resource.meta()));

        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_api(R::OBJECT_KIND, &name, e))?;
        Ok(())
    }

    async fn update_status(&self, resource: &R, status: &HierarchyStatus) -> Result<R, Error> {
        let name = resource.name_any();
        let api = self
            .registry
            .api(&self.client, R::OBJECT_KIND, Some(&Self::namespace_of(resource)?))?;
        let patch = json!({
            "metadata": { "resourceVersion": resource.meta().resource_version },
            "status": status,
        });

        let obj = api
            .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_api(R::OBJECT_KIND, &name, e))?;
        from_dynamic(obj)
    }
}
