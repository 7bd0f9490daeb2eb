//! Spyglass operator - fleet observability add-on management

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spyglass::certs;
use spyglass::controller::{error_policy, reconcile, teardown, watch, Context, KubeStore};
use spyglass::crd::{
    AddonActivation, AddonRegistration, ObservabilityAddon, ObservabilityFleet, Placement,
    WorkBundle,
};

/// Spyglass - converges an observability add-on across a fleet of member
/// clusters and manages the PKI securing hub-member traffic
#[derive(Parser, Debug)]
#[command(name = "spyglass", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Hub namespace holding the operator's secrets and placement resource
    #[arg(
        long,
        env = "SPYGLASS_HUB_NAMESPACE",
        default_value = spyglass::DEFAULT_HUB_NAMESPACE
    )]
    hub_namespace: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator (default mode)
    Controller,

    /// Rotate both certificate authorities and every leaf certificate
    ///
    /// Authorities are rotated before their dependent leaves so the
    /// re-signed leaves chain to the new trust bundles. Existing private
    /// keys are preserved when they still parse.
    RotateCerts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        print_crds()?;
        return Ok(());
    }

    match cli.command {
        Some(Commands::RotateCerts) => run_rotate(cli.hub_namespace).await,
        Some(Commands::Controller) | None => run_controller(cli.hub_namespace).await,
    }
}

/// Dump every CRD manifest to stdout
fn print_crds() -> anyhow::Result<()> {
    let crds = [
        serde_yaml::to_string(&ObservabilityFleet::crd())?,
        serde_yaml::to_string(&Placement::crd())?,
        serde_yaml::to_string(&ObservabilityAddon::crd())?,
        serde_yaml::to_string(&AddonActivation::crd())?,
        serde_yaml::to_string(&AddonRegistration::crd())?,
        serde_yaml::to_string(&WorkBundle::crd())?,
    ];
    println!("{}", crds.join("---\n"));
    Ok(())
}

/// Rotate authorities and leaves once, then exit
async fn run_rotate(hub_namespace: String) -> anyhow::Result<()> {
    let client = Client::try_default().await?;
    let store = KubeStore::new(client.clone(), hub_namespace.clone());

    // The advertised address feeds the server leaf SANs; absence just
    // narrows the SAN list to the in-cluster service name.
    let fleets: Api<ObservabilityFleet> = Api::all(client);
    let advertised = fleets
        .get_opt(spyglass::FLEET_NAME)
        .await?
        .and_then(|fleet| fleet.spec.advertised_address);

    certs::rotate_certificates(&store, &hub_namespace, advertised.as_deref()).await?;
    tracing::info!("certificate rotation complete");
    Ok(())
}

/// Run the controller until shutdown
async fn run_controller(hub_namespace: String) -> anyhow::Result<()> {
    let client = Client::try_default().await?;
    let ctx = Arc::new(
        Context::builder(client.clone())
            .hub_namespace(hub_namespace.clone())
            .build(),
    );

    let fleets: Api<ObservabilityFleet> = Api::all(client.clone());
    let placements: Api<Placement> = Api::namespaced(client.clone(), &hub_namespace);
    let addons: Api<ObservabilityAddon> = Api::all(client.clone());
    let bundles: Api<WorkBundle> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &hub_namespace);

    tracing::info!(hub_namespace = %hub_namespace, "starting Spyglass controller");

    // Every secondary watch funnels through the same primitive: filter by a
    // pure predicate, then enqueue the singleton fleet key.
    let placement_ns = hub_namespace.clone();
    let secret_ns = hub_namespace.clone();
    let reconcile_api = fleets.clone();

    Controller::new(fleets, WatcherConfig::default())
        .watches(
            placements,
            WatcherConfig::default(),
            watch::enqueue_fleet(move |p: &Placement| watch::is_watched_placement(p, &placement_ns)),
        )
        .watches(
            addons,
            WatcherConfig::default(),
            watch::enqueue_fleet(watch::is_owned_addon),
        )
        .watches(
            bundles,
            WatcherConfig::default(),
            watch::enqueue_fleet(watch::is_owned_bundle),
        )
        .watches(
            secrets,
            WatcherConfig::default(),
            watch::enqueue_fleet(move |s: &Secret| watch::is_server_ca_secret(s, &secret_ns)),
        )
        .shutdown_on_signal()
        .run(
            move |fleet, ctx| {
                let api = reconcile_api.clone();
                async move {
                    finalizer(&api, spyglass::FLEET_FINALIZER, fleet, |event| {
                        let ctx = ctx.clone();
                        async move {
                            match event {
                                FinalizerEvent::Apply(fleet) => reconcile(fleet, ctx).await,
                                FinalizerEvent::Cleanup(_) => teardown(ctx).await,
                            }
                        }
                    })
                    .await
                }
            },
            |fleet, error, ctx| error_policy(fleet, error, ctx),
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Spyglass controller shutting down");
    Ok(())
}
