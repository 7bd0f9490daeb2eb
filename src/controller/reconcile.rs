//! Work tracker / convergence engine
//!
//! One convergence pass takes the fleet specification and the placement
//! decision list and makes the store match: for every targeted member a
//! well-formed, up-to-date bundle exists; for every member outside the
//! target set no bundle, add-on record, or dependent resource remains.
//!
//! Passes are stateless between invocations. Individual member failures are
//! recorded and the pass continues; after cleanup and status aggregation a
//! single aggregate error is surfaced so the external scheduler retries the
//! whole pass. Already-converged members are never rolled back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use super::bundle::{build_bundle, bundle_name, is_canonical_bundle_name, BundleParts};
use super::context::Context;
use super::global::{ensure_global, ensure_global_deleted};
use super::placement::{resolve_targets, MemberTarget};
use super::status::aggregate_status;
use crate::certs::{self, MEMBER_CERT_SECRET, SERVER_CA_SECRET};
use crate::crd::{ObservabilityAddon, ObservabilityFleet, WorkBundle};
use crate::{Error, FLEET_NAME};

/// Requeue interval after a fully converged pass
const IDLE_REQUEUE: Duration = Duration::from_secs(300);

/// Run one convergence pass for the fleet resource.
///
/// Invoked for the apply side of the finalizer; the cleanup side is
/// [`teardown`]. Returns the requeue action on success and an error when
/// the pass must be retried wholesale.
#[instrument(skip(fleet, ctx), fields(fleet = %fleet.name_any()))]
pub async fn reconcile(
    fleet: Arc<ObservabilityFleet>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    info!("reconciling fleet");

    if fleet.name_any() != FLEET_NAME {
        warn!("ignoring fleet resource with unexpected name");
        return Ok(Action::await_change());
    }
    if fleet.is_paused() {
        info!("reconciliation is paused, nothing more to do");
        return Ok(Action::await_change());
    }

    // PKI bootstrap: bundles embed certificate material, so the authorities
    // and leaves must exist before any bundle is rendered.
    certs::ensure_certificates(ctx.secrets.as_ref(), &ctx.hub_namespace, &fleet).await?;

    let targets = match ctx.placements.get_placement().await? {
        Some(placement) => resolve_targets(&placement),
        None => {
            info!("placement not found, converging to an empty target set");
            Vec::new()
        }
    };
    debug!(count = targets.len(), "resolved member targets");

    let addons = ctx.members.list_addons().await?;
    let mut failed = apply_targets(&fleet, &ctx, &targets, &addons).await?;

    // Re-read so cleanup observes the records created or deleted above
    let addons = ctx.members.list_addons().await?;
    let bundles = ctx.works.list_bundles().await?;
    failed += cleanup_members(&ctx, &addons, &bundles).await?;

    aggregate_status(ctx.members.as_ref(), &addons).await?;

    if failed > 0 {
        return Err(Error::convergence(format!(
            "{failed} member operation(s) failed, pass will be retried"
        )));
    }
    Ok(Action::requeue(IDLE_REQUEUE))
}

/// Upsert the bundle set for every target and delete add-on records of
/// members no longer targeted. Returns the number of failed member
/// operations; store-wide failures abort immediately.
async fn apply_targets(
    fleet: &ObservabilityFleet,
    ctx: &Context,
    targets: &[MemberTarget],
    addons: &[ObservabilityAddon],
) -> Result<usize, Error> {
    let mut detargeted: Vec<String> = addons
        .iter()
        .filter_map(|addon| addon.namespace())
        .collect();
    let mut failed = 0usize;

    if !targets.is_empty() {
        ensure_global(ctx.globals.as_ref()).await?;

        let pull_secret = match &fleet.spec.image_pull_secret {
            Some(name) => {
                let secret = ctx.secrets.get_secret(name).await?;
                if secret.is_none() {
                    info!(name = %name, "image pull secret not found, bundles will omit it");
                }
                secret
            }
            None => None,
        };

        let server_ca = ctx
            .secrets
            .get_secret(SERVER_CA_SECRET)
            .await?
            .ok_or_else(|| Error::pki(format!("authority secret {SERVER_CA_SECRET} not found")))?;
        let member_certs = ctx
            .secrets
            .get_secret(MEMBER_CERT_SECRET)
            .await?
            .ok_or_else(|| Error::pki(format!("leaf secret {MEMBER_CERT_SECRET} not found")))?;

        let parts = BundleParts {
            fleet,
            hub_namespace: &ctx.hub_namespace,
            pull_secret: pull_secret.as_ref(),
            server_ca: &server_ca,
            member_certs: &member_certs,
        };

        for target in targets {
            detargeted.retain(|namespace| namespace != &target.namespace);
            if let Err(e) = apply_member(ctx, target, &parts).await {
                failed += 1;
                error!(
                    error = %e,
                    member = %target.name,
                    namespace = %target.namespace,
                    "failed to converge member"
                );
            }
        }
    }

    for namespace in detargeted {
        info!(namespace = %namespace, "member no longer targeted, deleting add-on record");
        if let Err(e) = ctx.members.delete_addon(&namespace).await {
            failed += 1;
            error!(error = %e, namespace = %namespace, "failed to delete add-on record");
        }
    }

    Ok(failed)
}

/// Ensure one member's full object set exists and is up to date
async fn apply_member(
    ctx: &Context,
    target: &MemberTarget,
    parts: &BundleParts<'_>,
) -> Result<(), Error> {
    let desired = build_bundle(target, parts)?;

    if ctx.members.get_addon(&target.namespace).await?.is_none() {
        info!(namespace = %target.namespace, "creating add-on record");
        ctx.members.create_addon(&desired.addon).await?;
    }

    if ctx
        .members
        .get_role_binding(&target.namespace)
        .await?
        .is_none()
    {
        info!(namespace = %target.namespace, "creating role binding");
        ctx.members.create_role_binding(&desired.role_binding).await?;
    }

    upsert_bundle(ctx, desired.work).await?;

    if ctx
        .members
        .get_activation(&target.namespace)
        .await?
        .is_none()
    {
        info!(namespace = %target.namespace, "creating activation record");
        ctx.members.create_activation(&desired.activation).await?;
    }

    Ok(())
}

/// Create the bundle, or replace it when the stored spec differs. The
/// replacement carries the stored resource version so concurrent edits are
/// detected by the store.
async fn upsert_bundle(ctx: &Context, mut desired: WorkBundle) -> Result<(), Error> {
    let name = desired.name_any();
    let namespace = desired.namespace().unwrap_or_default();

    match ctx.works.get_bundle(&name, &namespace).await? {
        None => {
            info!(name = %name, namespace = %namespace, "creating work bundle");
            ctx.works.create_bundle(&desired).await
        }
        Some(existing) if existing.spec != desired.spec => {
            desired.metadata.resource_version = existing.metadata.resource_version.clone();
            info!(name = %name, namespace = %namespace, "updating work bundle");
            ctx.works.update_bundle(&desired).await
        }
        Some(_) => {
            debug!(name = %name, namespace = %namespace, "work bundle already up to date");
            Ok(())
        }
    }
}

/// Delete malformed bundles, tear down members outside the active set, and
/// remove stale add-on records with no bundle. Returns the number of failed
/// member operations.
async fn cleanup_members(
    ctx: &Context,
    addons: &[ObservabilityAddon],
    bundles: &[WorkBundle],
) -> Result<usize, Error> {
    let live: HashSet<String> = addons
        .iter()
        .filter_map(|addon| addon.namespace())
        .collect();
    let mut stale: Vec<String> = addons
        .iter()
        .filter_map(|addon| addon.namespace())
        .collect();
    let mut failed = 0usize;

    for bundle in bundles {
        let name = bundle.name_any();
        let namespace = bundle.namespace().unwrap_or_default();

        if !is_canonical_bundle_name(&name, &namespace) {
            warn!(
                name = %name,
                namespace = %namespace,
                "deleting work bundle violating the naming convention"
            );
            if let Err(e) = ctx.works.delete_bundle(&name, &namespace).await {
                failed += 1;
                error!(error = %e, name = %name, "failed to delete malformed work bundle");
            }
            continue;
        }

        if !live.contains(&namespace) {
            info!(namespace = %namespace, "member no longer active, tearing down its resources");
            if let Err(e) = teardown_member(ctx, &namespace).await {
                failed += 1;
                error!(error = %e, namespace = %namespace, "failed to tear down member");
            }
        } else {
            stale.retain(|ns| ns != &namespace);
        }
    }

    for namespace in stale {
        info!(namespace = %namespace, "deleting stale add-on record with no work bundle");
        if let Err(e) = ctx.members.delete_addon(&namespace).await {
            failed += 1;
            error!(error = %e, namespace = %namespace, "failed to delete stale add-on record");
        }
    }

    Ok(failed)
}

/// Delete one member's activation record, role binding, and bundle
async fn teardown_member(ctx: &Context, namespace: &str) -> Result<(), Error> {
    ctx.members.delete_activation(namespace).await?;
    ctx.members.delete_role_binding(namespace).await?;
    ctx.works
        .delete_bundle(&bundle_name(namespace), namespace)
        .await?;
    Ok(())
}

/// Tear down all member state after the fleet resource is deleted.
///
/// Invoked for the cleanup side of the finalizer. The shared singletons go
/// last and only once no bundles remain; any failure keeps the finalizer in
/// place so the next pass retries the whole teardown.
#[instrument(skip(ctx))]
pub async fn teardown(ctx: Arc<Context>) -> Result<Action, Error> {
    info!("add-on source deleted, tearing down all member state");

    let addons = ctx.members.list_addons().await?;
    for addon in &addons {
        let namespace = addon.namespace().unwrap_or_default();
        info!(namespace = %namespace, "deleting add-on record");
        ctx.members.delete_addon(&namespace).await?;
    }

    let bundles = ctx.works.list_bundles().await?;
    for bundle in &bundles {
        let name = bundle.name_any();
        let namespace = bundle.namespace().unwrap_or_default();
        info!(name = %name, namespace = %namespace, "deleting member resources");
        ctx.members.delete_activation(&namespace).await?;
        ctx.members.delete_role_binding(&namespace).await?;
        ctx.works.delete_bundle(&name, &namespace).await?;
    }

    let remaining = ctx.works.list_bundles().await?;
    if !remaining.is_empty() {
        return Err(Error::convergence(format!(
            "{} work bundle(s) still present, teardown will be retried",
            remaining.len()
        )));
    }

    ensure_global_deleted(ctx.globals.as_ref()).await?;
    info!("teardown complete");
    Ok(Action::await_change())
}

/// Error policy for the controller: log and requeue shortly.
///
/// Retry cadence is owned by the controller runtime invoking passes; the
/// engine itself never retries internally.
pub fn error_policy<E: std::fmt::Debug>(
    fleet: Arc<ObservabilityFleet>,
    error: &E,
    _ctx: Arc<Context>,
) -> Action {
    error!(?error, fleet = %fleet.name_any(), "reconciliation failed");
    Action::requeue(Duration::from_secs(5))
}
