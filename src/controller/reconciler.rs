//! Hierarchy reconciler
//!
//! One pass per resource key. Nothing is remembered between passes: each
//! pass re-reads the resource, recomputes what to do from its fields and the
//! observed state of its dependents, and stops at the first error. That
//! keeps passes safe to repeat, interleave with retries, or abandon midway.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use super::boundary::{BoundaryProvisioner, BoundaryState, KubeBoundaryStore};
use super::credentials::{CredentialPropagator, KubeCredentialStore, KubeIdentityStore};
use super::finalizer::has_finalizer;
use super::resource::{parent_scope, validate, HierarchyResource};
use super::status::{self, next_status};
use super::store::{HierarchyStore, KubeHierarchyStore};
use crate::config::ControllerConfig;
use crate::crd::Condition;
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use crate::registry::KindRegistry;
use crate::Error;

/// Shared state for one hierarchy level's controller
pub struct Context<R: HierarchyResource> {
    /// Store for the hierarchy resources
    pub resources: Arc<dyn HierarchyStore<R>>,
    /// Boundary provisioner
    pub boundaries: BoundaryProvisioner,
    /// Credential propagator
    pub credentials: CredentialPropagator,
    /// Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Controller settings
    pub config: Arc<ControllerConfig>,
}

impl<R: HierarchyResource> Context<R> {
    /// Context wired to the API server
    pub fn builder(
        client: Client,
        registry: Arc<KindRegistry>,
        config: Arc<ControllerConfig>,
    ) -> ContextBuilder<R> {
        ContextBuilder {
            client,
            registry,
            config,
            events: None,
            _kind: std::marker::PhantomData,
        }
    }

    /// Context over explicit stores
    pub fn from_parts(
        resources: Arc<dyn HierarchyStore<R>>,
        boundaries: BoundaryProvisioner,
        credentials: CredentialPropagator,
        events: Arc<dyn EventPublisher>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            resources,
            boundaries,
            credentials,
            events,
            config,
        }
    }
}

/// Builder for a kube-backed [`Context`]
pub struct ContextBuilder<R> {
    client: Client,
    registry: Arc<KindRegistry>,
    config: Arc<ControllerConfig>,
    events: Option<Arc<dyn EventPublisher>>,
    _kind: std::marker::PhantomData<fn() -> R>,
}

impl<R: HierarchyResource> ContextBuilder<R> {
    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the context
    pub fn build(self) -> Context<R> {
        let Self {
            client,
            registry,
            config,
            events,
            ..
        } = self;

        let events = events.unwrap_or_else(|| {
            Arc::new(KubeEventPublisher::new(
                client.clone(),
                &format!("{}-controller", R::OBJECT_KIND.kind_str().to_lowercase()),
            ))
        });
        let credentials = CredentialPropagator::new(
            Arc::new(KubeCredentialStore::new(client.clone(), registry.clone())),
            Arc::new(KubeIdentityStore::new(client.clone(), registry.clone())),
            config.registry_secret.clone(),
        );

        Context::from_parts(
            Arc::new(KubeHierarchyStore::new(client.clone(), registry.clone())),
            BoundaryProvisioner::new(Arc::new(KubeBoundaryStore::new(client, registry))),
            credentials,
            events,
            config,
        )
    }
}

/// What a pass should do, derived only from the resource's own fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Deletion requested: delete the boundary, then release our finalizer if held
    Teardown,
    /// Not provisioned yet and unprotected: attach the finalizer first
    AttachFinalizer,
    /// Finalizer held: provision boundary then credentials
    Provision,
}

/// Decide the phase for `resource`
pub fn plan<R: HierarchyResource>(resource: &R) -> Phase {
    if resource.meta().deletion_timestamp.is_some() {
        Phase::Teardown
    } else if has_finalizer(resource.meta()) {
        Phase::Provision
    } else {
        Phase::AttachFinalizer
    }
}

/// Reconcile the resource `namespace/name`.
///
/// Returns the delay after which to poll again, or `None` when the pass
/// reached a terminal state. Errors are returned unclassified for the caller
/// to schedule.
#[instrument(skip(ctx), fields(kind = %R::OBJECT_KIND))]
pub async fn reconcile_key<R: HierarchyResource>(
    ctx: &Context<R>,
    namespace: &str,
    name: &str,
) -> Result<Option<Duration>, Error> {
    let Some(resource) = ctx.resources.get(namespace, name).await? else {
        debug!("resource no longer exists");
        return Ok(None);
    };

    let resource = mark_reconciling(ctx, resource).await?;
    let phase = plan(&resource);
    debug!(?phase, "planned pass");

    match phase {
        Phase::Teardown => {
            teardown(ctx, &resource).await?;
            Ok(None)
        }
        Phase::AttachFinalizer => {
            check_spec(ctx, &resource).await?;
            ctx.resources.add_finalizer(&resource).await?;
            info!("finalizer attached");
            Ok(Some(ctx.config.boundary_poll_interval))
        }
        Phase::Provision => {
            check_spec(ctx, &resource).await?;
            let previously_ready = status::is_ready(resource.hierarchy_status())
                .then(|| resource.clone());
            let outcome = provision(ctx, resource).await;
            if let (Err(err), Some(resource)) = (&outcome, previously_ready) {
                record_failure(ctx, resource, err).await;
            }
            outcome
        }
    }
}

/// Persist Ready=Unknown unless the start of this generation is already visible
async fn mark_reconciling<R: HierarchyResource>(ctx: &Context<R>, resource: R) -> Result<R, Error> {
    if status::start_reflected(resource.hierarchy_status(), resource.meta().generation) {
        return Ok(resource);
    }
    let (resource, _) = write_ready(ctx, resource, None, status::reconciling()).await?;
    Ok(resource)
}

/// Write the Ready condition (and optionally the guid) if anything changed.
///
/// Returns the stored resource and whether a write happened.
async fn write_ready<R: HierarchyResource>(
    ctx: &Context<R>,
    resource: R,
    guid: Option<&str>,
    condition: Condition,
) -> Result<(R, bool), Error> {
    let current = resource.hierarchy_status();
    match next_status(current, resource.meta().generation, guid, condition) {
        Some(status) => {
            let updated = ctx.resources.update_status(&resource, &status).await?;
            Ok((updated, true))
        }
        None => Ok((resource, false)),
    }
}

/// Surface malformed input as Ready=False and a terminal error
async fn check_spec<R: HierarchyResource>(ctx: &Context<R>, resource: &R) -> Result<(), Error> {
    let Err(err) = validate(resource) else {
        return Ok(());
    };
    write_ready(ctx, resource.clone(), None, status::invalid_spec(err.to_string())).await?;
    Err(err)
}

/// Drop Ready=True after a failed pass; the pass error still wins
async fn record_failure<R: HierarchyResource>(ctx: &Context<R>, resource: R, err: &Error) {
    let condition = status::provisioning_failed(err.to_string());
    if let Err(write_err) = write_ready(ctx, resource, None, condition).await {
        warn!(error = %write_err, "failed to record provisioning failure");
    }
}

async fn teardown<R: HierarchyResource>(ctx: &Context<R>, resource: &R) -> Result<(), Error> {
    let boundary = resource.name_any();
    ctx.boundaries.teardown(&boundary).await?;
    if has_finalizer(resource.meta()) {
        ctx.resources.remove_finalizer(resource).await?;
        info!(namespace = %boundary, "finalizer released");
    }

    ctx.events
        .publish(
            &resource.object_ref(&()),
            EventType::Normal,
            reasons::BOUNDARY_DELETED,
            actions::TEARDOWN,
            Some(format!("Requested deletion of namespace {boundary}")),
        )
        .await;
    Ok(())
}

async fn provision<R: HierarchyResource>(
    ctx: &Context<R>,
    resource: R,
) -> Result<Option<Duration>, Error> {
    let boundary = resource.name_any();

    if ctx.boundaries.ensure(&resource).await? == BoundaryState::Pending {
        if status::is_ready(resource.hierarchy_status()) {
            write_ready(ctx, resource, None, status::boundary_pending(&boundary)).await?;
        }
        return Ok(Some(ctx.config.boundary_poll_interval));
    }

    ctx.credentials
        .ensure(&parent_scope(&resource)?, &boundary, R::REQUIRED_IDENTITIES)
        .await?;

    let (resource, changed) =
        write_ready(ctx, resource, Some(&boundary), status::provisioned()).await?;
    if changed {
        info!(namespace = %boundary, "provisioned");
        ctx.events
            .publish(
                &resource.object_ref(&()),
                EventType::Normal,
                reasons::PROVISIONED,
                actions::PROVISION,
                Some(format!("Namespace {boundary} is ready")),
            )
            .await;
    }
    Ok(None)
}
