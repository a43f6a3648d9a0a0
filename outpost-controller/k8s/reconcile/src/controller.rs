use crate::{
    database,
    deployment::DeploymentReconciler,
    ingress::IngressReconciler,
    middleware::TraefikMiddlewareReconciler,
    reconciler::{self, Context, Reconciler},
    route::{HttpRouteReconciler, TcpRouteReconciler, UdpRouteReconciler},
    secret::SecretReconciler,
    service::ServiceReconciler,
    service_monitor::ServiceMonitorReconciler,
};
use outpost_controller_core::{
    logs, Component, ConnectionState, ControllerError, DeploymentPort, Observe, Outcome, Outpost,
    Platform, Profile,
};
use outpost_controller_k8s_api::Cluster;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Converges the objects an outpost needs on a Kubernetes cluster.
pub struct KubernetesController<C> {
    cluster: C,
    ctx: Context,
    order: Vec<Component>,
    observer: Arc<dyn Observe>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Binds `$r` to the reconciler for `$component` and evaluates `$body`.
macro_rules! with_reconciler {
    ($component:expr, |$r:ident| $body:expr) => {
        match $component {
            Component::Secret => {
                let $r = SecretReconciler;
                $body
            }
            Component::Deployment => {
                let $r = DeploymentReconciler;
                $body
            }
            Component::Service => {
                let $r = ServiceReconciler;
                $body
            }
            Component::Ingress => {
                let $r = IngressReconciler;
                $body
            }
            Component::HttpRoute => {
                let $r = HttpRouteReconciler;
                $body
            }
            Component::TcpRoute => {
                let $r = TcpRouteReconciler;
                $body
            }
            Component::UdpRoute => {
                let $r = UdpRouteReconciler;
                $body
            }
            Component::TraefikMiddleware => {
                let $r = TraefikMiddlewareReconciler;
                $body
            }
            Component::ServiceMonitor => {
                let $r = ServiceMonitorReconciler;
                $body
            }
        }
    };
}

// === impl KubernetesController ===

impl<C: Cluster> KubernetesController<C> {
    pub fn new(
        cluster: C,
        outpost: Arc<Outpost>,
        platform: &Platform,
        profile: &Profile,
        observer: Arc<dyn Observe>,
    ) -> Self {
        Self {
            cluster,
            ctx: Context::new(outpost, platform, profile.kubernetes_ports()),
            order: profile.reconcile_order(),
            observer,
        }
    }

    pub fn reconcile_order(&self) -> &[Component] {
        &self.order
    }

    pub fn ports(&self) -> &[DeploymentPort] {
        &self.ctx.ports
    }

    pub fn object_name(&self) -> &str {
        &self.ctx.name
    }

    pub async fn up(&self) -> Result<(), ControllerError> {
        for &component in &self.order {
            self.step(component, Direction::Up).await?;
        }
        Ok(())
    }

    /// Removes objects in reverse order, so nothing routes to a removed
    /// Service.
    pub async fn down(&self) -> Result<(), ControllerError> {
        for &component in self.order.iter().rev() {
            self.step(component, Direction::Down).await?;
        }
        Ok(())
    }

    /// Like `up`, returning what each step logged, prefixed with the
    /// component's title.
    pub async fn up_with_logs(&self) -> Result<Vec<String>, ControllerError> {
        self.steps_with_logs(self.order.iter().copied(), Direction::Up)
            .await
    }

    pub async fn down_with_logs(&self) -> Result<Vec<String>, ControllerError> {
        self.steps_with_logs(self.order.iter().rev().copied(), Direction::Down)
            .await
    }

    /// The manifests `up` would converge toward.
    pub fn static_deployment(&self) -> Result<String, serde_yaml::Error> {
        render(&self.ctx, &self.order)
    }

    pub async fn state(&self) -> ConnectionState {
        match self.cluster.version().await {
            Ok(version) => ConnectionState::healthy(version),
            Err(error) => {
                info!(%error, "Failed to get cluster version");
                ConnectionState::unhealthy()
            }
        }
    }

    async fn steps_with_logs(
        &self,
        components: impl Iterator<Item = Component>,
        direction: Direction,
    ) -> Result<Vec<String>, ControllerError> {
        let mut lines = Vec::new();
        for component in components {
            let (result, logs) = logs::capture(self.step(component, direction)).await;
            let title = component.title();
            lines.extend(logs.into_iter().map(|line| format!("{title}: {line}")));
            result?;
        }
        Ok(lines)
    }

    async fn step(
        &self,
        component: Component,
        direction: Direction,
    ) -> Result<Outcome, ControllerError> {
        let outpost = &*self.ctx.outpost;
        let cluster = &self.cluster;

        let result = async move {
            if outpost.config.is_disabled(component) {
                info!("Disabled");
                return Ok(Outcome::Disabled);
            }
            let resolved;
            let ctx = if component == Component::Deployment
                && direction == Direction::Up
                && !DeploymentReconciler.skip(&self.ctx)
            {
                resolved = Context {
                    credential_files: database::credential_files(cluster, &self.ctx).await,
                    ..self.ctx.clone()
                };
                &resolved
            } else {
                &self.ctx
            };
            with_reconciler!(component, |r| {
                if reconciler::noop(&r, cluster, ctx).await {
                    debug!("Skipped");
                    return Ok(Outcome::Skipped);
                }
                match direction {
                    Direction::Up => reconciler::up(&r, cluster, ctx).await,
                    Direction::Down => reconciler::down(&r, cluster, ctx).await,
                }
            })
        }
        .instrument(info_span!("reconcile", component = %component))
        .await;

        match result {
            Ok(outcome) => {
                self.observer
                    .reconciled(outpost, component.as_str(), outcome);
                Ok(outcome)
            }
            Err(error) => {
                self.observer.failed(outpost, component.as_str());
                Err(ControllerError::component(component.as_str(), error))
            }
        }
    }
}

/// Renders the manifests for an outpost without contacting a cluster.
///
/// Components that are disabled or inapplicable to the outpost are left out.
/// Those that depend on an API extension are included, as the target
/// cluster is unknown.
pub fn static_manifests(
    outpost: Arc<Outpost>,
    platform: &Platform,
    profile: &Profile,
) -> Result<String, serde_yaml::Error> {
    let ctx = Context::new(outpost, platform, profile.kubernetes_ports());
    render(&ctx, &profile.reconcile_order())
}

fn render(ctx: &Context, order: &[Component]) -> Result<String, serde_yaml::Error> {
    let mut documents = Vec::new();
    for &component in order {
        if ctx.config().is_disabled(component) {
            continue;
        }
        let document = with_reconciler!(component, |r| {
            if r.skip(ctx) {
                continue;
            }
            let reference = reconciler::patched_reference(&r, ctx);
            if !r.creatable(&reference) {
                continue;
            }
            serde_yaml::to_string(&reference)?
        });
        documents.push(document);
    }
    Ok(documents.join("---\n"))
}
