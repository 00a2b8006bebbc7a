//! Controller configuration
//!
//! Parsed once from flags/environment at startup and shared read-only by
//! every reconciler.

use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::crd::validate_dns_label;
use crate::Error;

/// Default poll interval while a boundary finishes initializing
pub const DEFAULT_BOUNDARY_POLL_MS: u64 = 100;

/// Default deadline for a single reconcile pass
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;

/// Default requeue delay after a failed pass
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 5;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Command-line arguments for controller mode
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Namespace Org objects are created in
    #[arg(long, env = "TENANCY_ROOT_NAMESPACE", default_value = "cf")]
    pub root_namespace: String,

    /// Name of the registry credential Secret mirrored into every boundary
    #[arg(long, env = "TENANCY_REGISTRY_SECRET")]
    pub registry_secret: String,

    /// Requeue delay while a boundary namespace is not yet active
    #[arg(long, env = "TENANCY_BOUNDARY_POLL_MS", default_value_t = DEFAULT_BOUNDARY_POLL_MS)]
    pub boundary_poll_ms: u64,

    /// Deadline for one reconcile pass
    #[arg(long, env = "TENANCY_RECONCILE_TIMEOUT_SECS", default_value_t = DEFAULT_RECONCILE_TIMEOUT_SECS)]
    pub reconcile_timeout_secs: u64,

    /// Base requeue delay after a failed pass
    #[arg(long, env = "TENANCY_ERROR_REQUEUE_SECS", default_value_t = DEFAULT_ERROR_REQUEUE_SECS)]
    pub error_requeue_secs: u64,

    /// Reconciles allowed to run in parallel per controller (distinct keys only)
    #[arg(long, env = "TENANCY_CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,

    /// Log output format
    #[arg(long, value_enum, env = "TENANCY_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Immutable settings injected into each reconciler
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Namespace Org objects are created in
    pub root_namespace: String,
    /// Name of the registry credential Secret to mirror
    pub registry_secret: String,
    /// Requeue delay while a boundary is not active
    pub boundary_poll_interval: Duration,
    /// Deadline for one reconcile pass
    pub reconcile_timeout: Duration,
    /// Base requeue delay after a failed pass
    pub error_requeue: Duration,
    /// Parallel reconciles per controller
    pub concurrency: u16,
}

impl ControllerConfig {
    /// Configuration with defaults for everything except the credential name
    pub fn new(root_namespace: impl Into<String>, registry_secret: impl Into<String>) -> Self {
        Self {
            root_namespace: root_namespace.into(),
            registry_secret: registry_secret.into(),
            boundary_poll_interval: Duration::from_millis(DEFAULT_BOUNDARY_POLL_MS),
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            error_requeue: Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS),
            concurrency: 4,
        }
    }

    /// Reject settings the controllers cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        validate_dns_label("root namespace", &self.root_namespace)?;
        if self.registry_secret.is_empty() {
            return Err(Error::configuration("registry secret name must not be empty"));
        }
        if self.boundary_poll_interval.is_zero() || self.reconcile_timeout.is_zero() {
            return Err(Error::configuration(
                "boundary poll interval and reconcile timeout must be positive",
            ));
        }
        if self.error_requeue.is_zero() {
            return Err(Error::configuration("error requeue delay must be positive"));
        }
        if self.concurrency == 0 {
            return Err(Error::configuration("concurrency must be at least 1"));
        }
        Ok(())
    }
}

impl TryFrom<&ControllerArgs> for ControllerConfig {
    type Error = Error;

    fn try_from(args: &ControllerArgs) -> Result<Self, Self::Error> {
        let config = Self {
            root_namespace: args.root_namespace.clone(),
            registry_secret: args.registry_secret.clone(),
            boundary_poll_interval: Duration::from_millis(args.boundary_poll_ms),
            reconcile_timeout: Duration::from_secs(args.reconcile_timeout_secs),
            error_requeue: Duration::from_secs(args.error_requeue_secs),
            concurrency: args.concurrency,
        };
        config.validate()?;
        Ok(config)
    }
}
