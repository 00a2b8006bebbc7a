//! Lattice Tenancy - reconciles orgs and spaces onto Kubernetes namespaces

use std::sync::Arc;

use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client, CustomResourceExt};

use lattice_tenancy::config::{ControllerArgs, ControllerConfig};
use lattice_tenancy::controller::{run_controller, Context};
use lattice_tenancy::crd::{Org, Space};
use lattice_tenancy::registry::KindRegistry;
use lattice_tenancy::retry::{retry_with_backoff, RetryConfig};
use lattice_tenancy::telemetry::init_telemetry;
use lattice_tenancy::FIELD_MANAGER;

/// Attempts at installing CRDs before startup gives up
const CRD_INSTALL_ATTEMPTS: u32 = 10;

/// Lattice Tenancy - maps the org/space hierarchy onto isolated namespaces
#[derive(Parser, Debug)]
#[command(name = "lattice-tenancy", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the org and space controllers
    ///
    /// Both controllers share one client and kind registry. Each Org gets a
    /// namespace named after it; each Space gets one too, with the registry
    /// credential mirrored in and the run and build identities created.
    Controller(ControllerArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The controller cannot talk to the API server without a working TLS implementation.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        for crd in [Org::crd(), Space::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run(args).await,
        None => anyhow::bail!("no command given, see --help"),
    }
}

/// Install our CRDs with server-side apply so their schema tracks the binary
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for (name, crd) in [
        ("orgs.tenancy.lattice.dev", Org::crd()),
        ("spaces.tenancy.lattice.dev", Space::crd()),
    ] {
        tracing::info!(crd = name, "installing CRD");
        crds.patch(name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("tenancy CRDs installed/updated");
    Ok(())
}

async fn run(args: ControllerArgs) -> anyhow::Result<()> {
    init_telemetry(args.log_format)?;

    let config = Arc::new(ControllerConfig::try_from(&args)?);
    tracing::info!(
        root_namespace = %config.root_namespace,
        registry_secret = %config.registry_secret,
        concurrency = config.concurrency,
        "starting tenancy controllers"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    retry_with_backoff(
        &RetryConfig::with_max_attempts(CRD_INSTALL_ATTEMPTS),
        "install CRDs",
        || ensure_crds_installed(&client),
    )
    .await?;

    let registry = Arc::new(KindRegistry::discover(client.clone()).await);

    let org_ctx = Arc::new(
        Context::<Org>::builder(client.clone(), registry.clone(), config.clone()).build(),
    );
    let space_ctx =
        Arc::new(Context::<Space>::builder(client.clone(), registry, config.clone()).build());

    let orgs: Api<Org> = Api::namespaced(client.clone(), &config.root_namespace);
    let spaces: Api<Space> = Api::all(client.clone());
    let namespaces: Api<Namespace> = Api::all(client);

    tokio::select! {
        _ = run_controller(orgs, namespaces.clone(), org_ctx) => {
            tracing::info!("org controller stopped");
        }
        _ = run_controller(spaces, namespaces, space_ctx) => {
            tracing::info!("space controller stopped");
        }
    }

    Ok(())
}
