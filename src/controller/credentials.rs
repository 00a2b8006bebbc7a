//! Registry credential mirroring and service identity provisioning

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LocalObjectReference, ObjectReference, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::resource::IdentityRole;
use crate::registry::{from_dynamic, to_dynamic, KindRegistry, ObjectKind};
use crate::{Error, FIELD_MANAGER, IDENTITY_ROLE_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE};

/// Access to registry credential Secrets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a secret. A missing secret is [`Error::NotFound`].
    async fn get(&self, namespace: &str, name: &str) -> Result<Secret, Error>;

    /// Create a secret
    async fn create(&self, secret: &Secret) -> Result<(), Error>;

    /// Overwrite an existing secret's contents
    async fn replace(&self, secret: &Secret) -> Result<(), Error>;

    /// Delete a secret. A missing secret is [`Error::NotFound`].
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Access to service identities
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch a service account; `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceAccount>, Error>;

    /// Create a service account
    async fn create(&self, account: &ServiceAccount) -> Result<(), Error>;
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, Error> {
    obj.namespace()
        .ok_or_else(|| Error::internal(format!("{} has no namespace", obj.name_any())))
}

/// [`CredentialStore`] backed by the API server
pub struct KubeCredentialStore {
    client: Client,
    registry: Arc<KindRegistry>,
}

impl KubeCredentialStore {
    /// Create a store resolving its API through `registry`
    pub fn new(client: Client, registry: Arc<KindRegistry>) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl CredentialStore for KubeCredentialStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Secret, Error> {
        let api = self.registry.api(&self.client, ObjectKind::Secret, Some(namespace))?;
        let obj = api
            .get(name)
            .await
            .map_err(|e| Error::from_api(ObjectKind::Secret, name, e))?;
        from_dynamic(obj)
    }

    async fn create(&self, secret: &Secret) -> Result<(), Error> {
        let name = secret.name_any();
        let api = self
            .registry
            .api(&self.client, ObjectKind::Secret, Some(&namespace_of(secret)?))?;
        api.create(&PostParams::default(), &to_dynamic(secret)?)
            .await
            .map_err(|e| Error::from_api(ObjectKind::Secret, &name, e))?;
        Ok(())
    }

    async fn replace(&self, secret: &Secret) -> Result<(), Error> {
        let name = secret.name_any();
        let api = self
            .registry
            .api(&self.client, ObjectKind::Secret, Some(&namespace_of(secret)?))?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(&to_dynamic(secret)?))
            .await
            .map_err(|e| Error::from_api(ObjectKind::Secret, &name, e))?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api = self.registry.api(&self.client, ObjectKind::Secret, Some(namespace))?;
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_api(ObjectKind::Secret, name, e))?;
        Ok(())
    }
}

/// [`IdentityStore`] backed by the API server
pub struct KubeIdentityStore {
    client: Client,
    registry: Arc<KindRegistry>,
}

impl KubeIdentityStore {
    /// Create a store resolving its API through `registry`
    pub fn new(client: Client, registry: Arc<KindRegistry>) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl IdentityStore for KubeIdentityStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceAccount>, Error> {
        let api = self
            .registry
            .api(&self.client, ObjectKind::ServiceAccount, Some(namespace))?;
        match api.get_opt(name).await {
            Ok(obj) => obj.map(from_dynamic::<ServiceAccount>).transpose(),
            Err(e) => Err(Error::from_api(ObjectKind::ServiceAccount, name, e)),
        }
    }

    async fn create(&self, account: &ServiceAccount) -> Result<(), Error> {
        let name = account.name_any();
        let api = self.registry.api(
            &self.client,
            ObjectKind::ServiceAccount,
            Some(&namespace_of(account)?),
        )?;
        api.create(&PostParams::default(), &to_dynamic(account)?)
            .await
            .map_err(|e| Error::from_api(ObjectKind::ServiceAccount, &name, e))?;
        Ok(())
    }
}

/// Copy of `source` for `boundary`: same name, type and bytes.
pub fn mirror_of(source: &Secret, boundary: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: source.metadata.name.clone(),
            namespace: Some(boundary.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        type_: source.type_.clone(),
        data: source.data.clone(),
        ..Default::default()
    }
}

/// Whether `existing` already carries the same payload as `desired`
pub fn mirror_matches(existing: &Secret, desired: &Secret) -> bool {
    existing.type_ == desired.type_ && existing.data == desired.data
}

/// ServiceAccount for `role`, pulling images with `secret_name`
pub fn identity_for(role: IdentityRole, boundary: &str, secret_name: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(role.account_name().to_string()),
            namespace: Some(boundary.to_string()),
            labels: Some(BTreeMap::from([
                (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
                (IDENTITY_ROLE_LABEL.to_string(), role.system().to_string()),
            ])),
            ..Default::default()
        },
        secrets: Some(vec![ObjectReference {
            name: Some(secret_name.to_string()),
            ..Default::default()
        }]),
        image_pull_secrets: Some(vec![LocalObjectReference {
            name: secret_name.to_string(),
        }]),
        ..Default::default()
    }
}

/// Mirrors the registry credential into a boundary and creates the
/// identities that reference it.
pub struct CredentialPropagator {
    credentials: Arc<dyn CredentialStore>,
    identities: Arc<dyn IdentityStore>,
    secret_name: String,
}

impl CredentialPropagator {
    /// `secret_name` is the well-known credential to mirror
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        identities: Arc<dyn IdentityStore>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            identities,
            secret_name: secret_name.into(),
        }
    }

    /// Ensure the credential and every identity in `roles` exist in `boundary`.
    ///
    /// Any failure to read the source credential, including not-found, fails
    /// the pass. For each identity: present means nothing to do, absent means
    /// create, any other read failure fails the pass.
    pub async fn ensure(
        &self,
        source_namespace: &str,
        boundary: &str,
        roles: &[IdentityRole],
    ) -> Result<(), Error> {
        let source = self
            .credentials
            .get(source_namespace, &self.secret_name)
            .await?;
        self.mirror(&source, boundary).await?;

        for role in roles {
            self.ensure_identity(*role, boundary).await?;
        }
        Ok(())
    }

    async fn mirror(&self, source: &Secret, boundary: &str) -> Result<(), Error> {
        let desired = mirror_of(source, boundary);

        match self.credentials.get(boundary, &self.secret_name).await {
            Ok(existing) if mirror_matches(&existing, &desired) => {
                debug!(namespace = %boundary, secret = %self.secret_name, "credential up to date");
                Ok(())
            }
            Ok(existing) if existing.type_ == desired.type_ => {
                info!(namespace = %boundary, secret = %self.secret_name, "refreshing mirrored credential");
                self.credentials.replace(&desired).await
            }
            // Secret type is immutable, so a retyped source means recreating the mirror
            Ok(existing) => {
                info!(
                    namespace = %boundary,
                    secret = %self.secret_name,
                    from = existing.type_.as_deref().unwrap_or_default(),
                    to = desired.type_.as_deref().unwrap_or_default(),
                    "recreating mirrored credential with new type"
                );
                if let Err(e) = self.credentials.delete(boundary, &self.secret_name).await {
                    if !e.is_not_found() {
                        return Err(e);
                    }
                }
                self.create_mirror(&desired, boundary).await
            }
            Err(e) if e.is_not_found() => self.create_mirror(&desired, boundary).await,
            Err(e) => Err(e),
        }
    }

    async fn create_mirror(&self, desired: &Secret, boundary: &str) -> Result<(), Error> {
        match self.credentials.create(desired).await {
            Ok(()) => {
                info!(namespace = %boundary, secret = %self.secret_name, "mirrored credential");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn ensure_identity(&self, role: IdentityRole, boundary: &str) -> Result<(), Error> {
        let name = role.account_name();
        if self.identities.get(boundary, name).await?.is_some() {
            return Ok(());
        }

        match self
            .identities
            .create(&identity_for(role, boundary, &self.secret_name))
            .await
        {
            Ok(()) => {
                info!(namespace = %boundary, service_account = name, "created service identity");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(namespace = %boundary, service_account = name, "service identity created concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
