//! Integration tests for the reconcile loop
//!
//! These tests run the org and space controllers in-process against a live
//! cluster and follow a tenant from creation to deletion.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tokio::task::JoinHandle;

use lattice_tenancy::config::ControllerConfig;
use lattice_tenancy::controller::{run_controller, Context, HierarchyResource};
use lattice_tenancy::crd::{ConditionStatus, Org, OrgSpec, Space, SpaceSpec};
use lattice_tenancy::registry::KindRegistry;

use super::helpers::{
    ensure_test_cluster, put_registry_secret, wait_for, TEST_REGISTRY_SECRET,
    TEST_ROOT_NAMESPACE,
};

const SETTLE: Duration = Duration::from_secs(60);

fn start_controllers(client: &Client) -> Vec<JoinHandle<()>> {
    let registry = Arc::new(KindRegistry::builtin());
    let config = Arc::new(ControllerConfig::new(TEST_ROOT_NAMESPACE, TEST_REGISTRY_SECRET));
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let org_ctx =
        Arc::new(Context::<Org>::builder(client.clone(), registry.clone(), config.clone()).build());
    let space_ctx = Arc::new(Context::<Space>::builder(client.clone(), registry, config).build());

    vec![
        tokio::spawn(run_controller(
            Api::<Org>::namespaced(client.clone(), TEST_ROOT_NAMESPACE),
            namespaces.clone(),
            org_ctx,
        )),
        tokio::spawn(run_controller(
            Api::<Space>::all(client.clone()),
            namespaces,
            space_ctx,
        )),
    ]
}

async fn is_ready<R: HierarchyResource>(api: &Api<R>, name: &str) -> bool {
    match api.get_opt(name).await {
        Ok(Some(obj)) => obj
            .hierarchy_status()
            .and_then(|s| s.condition("Ready"))
            .is_some_and(|c| c.status == ConditionStatus::True),
        _ => false,
    }
}

async fn is_gone<R: HierarchyResource>(api: &Api<R>, name: &str) -> bool {
    matches!(api.get_opt(name).await, Ok(None))
}

/// Story: An org and a space are provisioned and torn down
///
/// Expected behavior:
/// - The org gets a namespace named after it holding the registry credential
/// - The space gets a namespace with the credential and both identities
/// - Deleting the space removes it only after its namespace deletion started
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_tenant_is_provisioned_and_torn_down() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let controllers = start_controllers(&client);

    let org_name = "it-org";
    let space_name = "it-space";
    let orgs: Api<Org> = Api::namespaced(client.clone(), TEST_ROOT_NAMESPACE);
    let org = Org::new(
        org_name,
        OrgSpec {
            display_name: "Integration".to_string(),
        },
    );
    orgs.create(&PostParams::default(), &org)
        .await
        .expect("failed to create org");

    assert!(
        wait_for(SETTLE, || is_ready(&orgs, org_name)).await,
        "org never became ready"
    );
    let org_secrets: Api<Secret> = Api::namespaced(client.clone(), org_name);
    assert!(org_secrets.get_opt(TEST_REGISTRY_SECRET).await.unwrap().is_some());

    let spaces: Api<Space> = Api::namespaced(client.clone(), org_name);
    let space = Space::new(
        space_name,
        SpaceSpec {
            display_name: "dev".to_string(),
        },
    );
    spaces
        .create(&PostParams::default(), &space)
        .await
        .expect("failed to create space");

    assert!(
        wait_for(SETTLE, || is_ready(&spaces, space_name)).await,
        "space never became ready"
    );
    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), space_name);
    for account in ["app-runner", "image-builder"] {
        let sa = accounts.get(account).await.expect("identity missing");
        let pulls = sa.image_pull_secrets.unwrap_or_default();
        assert!(pulls.iter().any(|p| p.name == TEST_REGISTRY_SECRET));
    }

    spaces
        .delete(space_name, &DeleteParams::default())
        .await
        .expect("failed to delete space");
    assert!(
        wait_for(SETTLE, || is_gone(&spaces, space_name)).await,
        "space was never released"
    );
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let boundary = namespaces.get_opt(space_name).await.unwrap();
    assert!(boundary.map_or(true, |ns| ns.metadata.deletion_timestamp.is_some()));

    orgs.delete(org_name, &DeleteParams::default())
        .await
        .expect("failed to delete org");
    assert!(wait_for(SETTLE, || is_gone(&orgs, org_name)).await);

    for handle in controllers {
        handle.abort();
    }
}

/// Story: A rotated registry credential reaches existing boundaries
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_rotated_credential_is_mirrored_on_next_pass() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let controllers = start_controllers(&client);

    let org_name = "it-rotate";
    let orgs: Api<Org> = Api::namespaced(client.clone(), TEST_ROOT_NAMESPACE);
    let org = Org::new(
        org_name,
        OrgSpec {
            display_name: "Rotation".to_string(),
        },
    );
    orgs.create(&PostParams::default(), &org)
        .await
        .expect("failed to create org");
    assert!(wait_for(SETTLE, || is_ready(&orgs, org_name)).await);

    put_registry_secret(&client, TEST_ROOT_NAMESPACE, b"{\"auths\":{\"r\":{}}}")
        .await
        .expect("failed to rotate secret");
    // Touch the org so it is reconciled again
    orgs.patch(
        org_name,
        &kube::api::PatchParams::default(),
        &kube::api::Patch::Merge(serde_json::json!({"spec": {"displayName": "Rotated"}})),
    )
    .await
    .expect("failed to edit org");

    let mirrors: Api<Secret> = Api::namespaced(client.clone(), org_name);
    let mirrors = &mirrors;
    let rotated = wait_for(SETTLE, || async move {
        mirrors
            .get_opt(TEST_REGISTRY_SECRET)
            .await
            .ok()
            .flatten()
            .and_then(|s| s.data)
            .and_then(|d| d.get(".dockerconfigjson").cloned())
            .is_some_and(|v| v.0 == b"{\"auths\":{\"r\":{}}}".to_vec())
    })
    .await;
    assert!(rotated, "rotated credential never reached the org namespace");

    let _ = orgs.delete(org_name, &DeleteParams::default()).await;
    for handle in controllers {
        handle.abort();
    }
}
