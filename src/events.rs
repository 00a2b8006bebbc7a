//! Kubernetes Event recording for the tenancy controllers.
//!
//! Events are fire-and-forget: a failed publish is logged and never breaks
//! a reconcile pass.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Publishes Events about hierarchy resources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`. Never fails.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// `controller_name` shows up as the reporting component.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish event");
        }
    }
}

/// Publisher that drops everything.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reason strings, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    /// Boundary, credential and identities are all in place
    pub const PROVISIONED: &str = "Provisioned";
    /// Boundary deletion was accepted and the finalizer released
    pub const BOUNDARY_DELETED: &str = "BoundaryDeleted";
    /// A reconcile pass returned an error
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

/// Event action strings.
pub mod actions {
    /// Provisioning pass
    pub const PROVISION: &str = "Provision";
    /// Teardown pass
    pub const TEARDOWN: &str = "Teardown";
    /// Any reconcile pass
    pub const RECONCILE: &str = "Reconcile";
}
