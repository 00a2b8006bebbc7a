//! Wiring between the reconciler and `kube::runtime::Controller`
//!
//! The controller runtime provides the deduplicating queue with at most one
//! active reconcile per key; this module adapts its callbacks and sets up
//! the watches.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use kube::runtime::controller::{Action, Config as RuntimeConfig};
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, warn};

use super::reconciler::{reconcile_key, Context};
use super::resource::HierarchyResource;
use crate::events::{actions, reasons};
use crate::retry::jittered;
use crate::{Error, MANAGED_BY_LABEL, MANAGED_BY_VALUE, PARENT_NAMESPACE_LABEL};

/// Server-side watch timeout, kept below the client's read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Controller callback: run one pass under the configured deadline.
pub async fn reconcile<R: HierarchyResource>(
    resource: Arc<R>,
    ctx: Arc<Context<R>>,
) -> Result<Action, Error> {
    let name = resource.name_any();
    let namespace = resource
        .namespace()
        .ok_or_else(|| Error::configuration(format!("{} {name} has no namespace", R::OBJECT_KIND)))?;

    let deadline = ctx.config.reconcile_timeout;
    let outcome = tokio::time::timeout(deadline, reconcile_key(&ctx, &namespace, &name))
        .await
        .unwrap_or_else(|_| Err(Error::Timeout(deadline)));

    match outcome {
        Ok(Some(delay)) => Ok(Action::requeue(delay)),
        Ok(None) => Ok(Action::await_change()),
        Err(e) => {
            ctx.events
                .publish(
                    &resource.object_ref(&()),
                    EventType::Warning,
                    reasons::RECONCILE_FAILED,
                    actions::RECONCILE,
                    Some(e.to_string()),
                )
                .await;
            Err(e)
        }
    }
}

/// Controller callback on failure.
///
/// Retryable errors requeue after a jittered delay. Malformed input waits for
/// the object to change, since retrying it cannot succeed.
pub fn error_policy<R: HierarchyResource>(
    resource: Arc<R>,
    error: &Error,
    ctx: Arc<Context<R>>,
) -> Action {
    if !error.is_retryable() {
        warn!(
            kind = %R::OBJECT_KIND,
            name = %resource.name_any(),
            %error,
            "invalid resource, waiting for it to change"
        );
        return Action::await_change();
    }

    error!(
        kind = %R::OBJECT_KIND,
        name = %resource.name_any(),
        %error,
        "reconciliation failed"
    );
    Action::requeue(jittered(ctx.config.error_requeue))
}

/// Map a boundary Namespace event back to the resource that owns it
pub fn boundary_owner<R: HierarchyResource>(ns: Namespace) -> Option<ObjectRef<R>> {
    let labels = ns.metadata.labels.as_ref()?;
    let guid = labels.get(R::GUID_LABEL)?;
    let parent = labels.get(PARENT_NAMESPACE_LABEL)?;
    Some(ObjectRef::new(guid).within(parent))
}

/// Run the controller for one hierarchy level until shutdown is signalled.
pub async fn run_controller<R: HierarchyResource>(
    resources: Api<R>,
    namespaces: Api<Namespace>,
    ctx: Arc<Context<R>>,
) {
    let managed = format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}");
    let concurrency = ctx.config.concurrency;

    Controller::new(resources, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .watches(
            namespaces,
            WatcherConfig::default()
                .labels(&managed)
                .timeout(WATCH_TIMEOUT_SECS),
            boundary_owner::<R>,
        )
        .with_config(RuntimeConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile::<R>, error_policy::<R>, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(object = %obj, ?action, "reconciliation completed");
                }
                Err(e) => {
                    warn!(kind = %R::OBJECT_KIND, error = %e, "reconciliation error");
                }
            }
        })
        .await;
}
