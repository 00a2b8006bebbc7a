//! Shared setup for the live-cluster tests

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use lattice_tenancy::crd::{Org, Space};
use lattice_tenancy::FIELD_MANAGER;

/// Namespace the tests create Orgs in
pub const TEST_ROOT_NAMESPACE: &str = "tenancy-it";

/// Registry credential the tests mirror
pub const TEST_REGISTRY_SECRET: &str = "it-registry-credentials";

/// Connect to the current context and install the CRDs and root fixtures
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let client = Client::try_default()
        .await
        .map_err(|e| format!("no cluster available: {e}"))?;

    let params = PatchParams::apply(FIELD_MANAGER).force();
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    for (name, crd) in [
        ("orgs.tenancy.lattice.dev", Org::crd()),
        ("spaces.tenancy.lattice.dev", Space::crd()),
    ] {
        crds.patch(name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| format!("failed to install {name}: {e}"))?;
    }
    // Give the API server a moment to serve the new kinds
    tokio::time::sleep(Duration::from_secs(2)).await;

    let namespaces: Api<Namespace> = Api::all(client.clone());
    let root = Namespace {
        metadata: ObjectMeta {
            name: Some(TEST_ROOT_NAMESPACE.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    namespaces
        .patch(TEST_ROOT_NAMESPACE, &params, &Patch::Apply(&root))
        .await
        .map_err(|e| format!("failed to create root namespace: {e}"))?;

    put_registry_secret(&client, TEST_ROOT_NAMESPACE, b"{\"auths\":{}}").await?;
    Ok(client)
}

/// Create or overwrite the registry credential in `namespace`
pub async fn put_registry_secret(
    client: &Client,
    namespace: &str,
    payload: &[u8],
) -> Result<(), String> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(TEST_REGISTRY_SECRET.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        data: Some(BTreeMap::from([(
            ".dockerconfigjson".to_string(),
            ByteString(payload.to_vec()),
        )])),
        ..Default::default()
    };
    secrets
        .patch(
            TEST_REGISTRY_SECRET,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&secret),
        )
        .await
        .map_err(|e| format!("failed to write registry secret: {e}"))?;
    Ok(())
}

/// Poll `check` until it returns true or `timeout` passes
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    false
}
