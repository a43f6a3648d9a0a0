use crate::{database::CredentialFiles, meta};
use outpost_controller_core::{
    naming, Component, DeploymentPort, Outcome, Outpost, OutpostConfig, Platform,
};
use outpost_controller_k8s_api::{Cluster, Error, Object, Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What reconcilers derive reference objects from.
#[derive(Clone, Debug)]
pub struct Context {
    pub outpost: Arc<Outpost>,
    pub platform: Platform,
    pub ports: Vec<DeploymentPort>,
    /// Name shared by every object managed for the outpost.
    pub name: String,
    pub namespace: String,
    pub image: String,
    /// Resolved against the cluster before the Deployment is converged.
    pub credential_files: Option<CredentialFiles>,
}

/// How a live object has to change to match its reference.
///
/// Ordered by severity, so checks combine with `max`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trigger {
    NoChange,
    Update,
    Recreate,
}

/// Converges a single object kind.
pub(crate) trait Reconciler {
    type Object: Object;

    const COMPONENT: Component;

    /// Set for kinds served by an optional API extension, which is checked
    /// for before any other call.
    const EXTENSION: bool = false;

    /// Whether the kind is inapplicable to this outpost.
    fn skip(&self, _ctx: &Context) -> bool {
        false
    }

    fn reference(&self, ctx: &Context) -> Self::Object;

    /// Kind-specific checks, in addition to the metadata checks every kind
    /// gets.
    fn compare(&self, current: &Self::Object, reference: &Self::Object, ctx: &Context) -> Trigger;

    /// Whether `reference` is worth creating at all.
    fn creatable(&self, _reference: &Self::Object) -> bool {
        true
    }
}

// === impl Context ===

impl Context {
    pub fn new(outpost: Arc<Outpost>, platform: &Platform, ports: Vec<DeploymentPort>) -> Self {
        let config = &outpost.config;
        let name = naming::object_name(
            &config.object_naming_template,
            &outpost.name,
            &outpost.uuid_hex(),
        );
        let namespace = config.kubernetes_namespace.clone();
        let image = platform.container_image(&outpost);
        Self {
            platform: platform.clone(),
            ports,
            name,
            namespace,
            image,
            credential_files: None,
            outpost,
        }
    }

    pub fn config(&self) -> &OutpostConfig {
        &self.outpost.config
    }
}

// === impl Trigger ===

impl Trigger {
    pub fn update_if(drifted: bool) -> Self {
        if drifted {
            Self::Update
        } else {
            Self::NoChange
        }
    }
}

/// Whether a reconciler has nothing to do for this outpost on this cluster.
pub(crate) async fn noop<R: Reconciler, C: Cluster>(r: &R, cluster: &C, ctx: &Context) -> bool {
    if r.skip(ctx) {
        return true;
    }
    if R::EXTENSION && !cluster.serves::<R::Object>().await {
        debug!("API extension is not installed");
        return true;
    }
    false
}

/// The reference object with the operator's JSON patch applied.
pub(crate) fn patched_reference<R: Reconciler>(r: &R, ctx: &Context) -> R::Object {
    let reference = r.reference(ctx);
    let Some(patch) = ctx.config().json_patch(R::COMPONENT) else {
        return reference;
    };
    match apply_patch(&reference, patch) {
        Ok(patched) => patched,
        Err(error) => {
            warn!(%error, "Failed to apply JSON patch");
            reference
        }
    }
}

fn apply_patch<T: Serialize + DeserializeOwned>(
    object: &T,
    patch: &json_patch::Patch,
) -> anyhow::Result<T> {
    let mut doc = serde_json::to_value(object)?;
    json_patch::patch(&mut doc, &patch.0)?;
    Ok(serde_json::from_value(doc)?)
}

/// Compares a live object with its reference.
fn compare<R: Reconciler>(
    r: &R,
    current: &R::Object,
    reference: &R::Object,
    ctx: &Context,
) -> Trigger {
    let mut trigger = r.compare(current, reference, ctx);
    if !meta::contains(current.meta(), reference.meta()) {
        debug!("Labels or annotations differ");
        trigger = trigger.max(Trigger::Update);
    }
    if let Some(patch) = ctx.config().json_patch(R::COMPONENT) {
        if patch_drifts(current, patch) {
            debug!("JSON patch is not applied");
            trigger = trigger.max(Trigger::Update);
        }
    }
    trigger
}

/// Whether applying `patch` to `current` would change it.
///
/// A patch that cannot be applied to the live object is not drift; it may
/// refer to fields the server has not defaulted.
fn patch_drifts<T: Serialize>(current: &T, patch: &json_patch::Patch) -> bool {
    let Ok(doc) = serde_json::to_value(current) else {
        return false;
    };
    let mut patched = doc.clone();
    match json_patch::patch(&mut patched, &patch.0) {
        Ok(()) => patched != doc,
        Err(error) => {
            debug!(%error, "JSON patch does not apply to the current object");
            false
        }
    }
}

/// Converges the reconciler's object toward its reference.
pub(crate) async fn up<R: Reconciler, C: Cluster>(
    r: &R,
    cluster: &C,
    ctx: &Context,
) -> Result<Outcome, Error> {
    let reference = patched_reference(r, ctx);
    let current = cluster
        .get::<R::Object>(&ctx.namespace, &ctx.name)
        .await?;

    let trigger = match current.as_ref() {
        Some(current) => compare(r, current, &reference, ctx),
        None => Trigger::Recreate,
    };
    match trigger {
        Trigger::NoChange => {
            debug!("Object is up-to-date");
            Ok(Outcome::Unchanged)
        }
        Trigger::Update => {
            info!("Updating");
            match cluster.apply(&ctx.namespace, &ctx.name, &reference).await {
                Ok(()) => Ok(Outcome::Updated),
                Err(Error::Api(error)) if error.code == 422 => {
                    info!(%error, "Failed to update current, triggering re-create");
                    recreate(r, cluster, ctx, current.is_some(), &reference).await
                }
                Err(error) => Err(error),
            }
        }
        Trigger::Recreate => recreate(r, cluster, ctx, current.is_some(), &reference).await,
    }
}

async fn recreate<R: Reconciler, C: Cluster>(
    r: &R,
    cluster: &C,
    ctx: &Context,
    exists: bool,
    reference: &R::Object,
) -> Result<Outcome, Error> {
    if exists {
        info!("Deleting");
        match cluster.delete::<R::Object>(&ctx.namespace, &ctx.name).await {
            Ok(()) => {}
            Err(Error::Api(error)) if error.code == 404 => {}
            Err(error) => return Err(error),
        }
    }

    if !r.creatable(reference) {
        debug!("Nothing to create");
        return Ok(if exists {
            Outcome::Deleted
        } else {
            Outcome::Unchanged
        });
    }

    info!("Creating");
    cluster.create(&ctx.namespace, reference).await?;
    Ok(if exists {
        Outcome::Recreated
    } else {
        Outcome::Created
    })
}

/// Removes the reconciler's object, if it exists.
pub(crate) async fn down<R: Reconciler, C: Cluster>(
    _: &R,
    cluster: &C,
    ctx: &Context,
) -> Result<Outcome, Error> {
    let Some(current) = cluster
        .get::<R::Object>(&ctx.namespace, &ctx.name)
        .await?
    else {
        debug!("Object does not exist");
        return Ok(Outcome::Absent);
    };

    info!(name = %current.name_any(), "Deleting");
    match cluster.delete::<R::Object>(&ctx.namespace, &ctx.name).await {
        Ok(()) => Ok(Outcome::Deleted),
        Err(Error::Api(error)) if error.code == 404 => Ok(Outcome::Absent),
        Err(error) => Err(error),
    }
}
