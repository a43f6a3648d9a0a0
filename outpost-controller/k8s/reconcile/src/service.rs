use crate::{
    meta,
    reconciler::{Context, Reconciler, Trigger},
};
use outpost_controller_core::Component;
use outpost_controller_k8s_api::{IntOrString, Service, ServicePort, ServiceSpec};

/// Exposes the outpost's ports inside the cluster.
pub(crate) struct ServiceReconciler;

impl Reconciler for ServiceReconciler {
    type Object = Service;

    const COMPONENT: Component = Component::Service;

    fn reference(&self, ctx: &Context) -> Service {
        let ports = ctx
            .ports
            .iter()
            .map(|p| ServicePort {
                name: Some(p.name.to_string()),
                port: p.port.into(),
                protocol: Some(p.protocol.as_k8s_str().to_string()),
                target_port: Some(IntOrString::Int(p.container_port().into())),
                ..Default::default()
            })
            .collect();

        // The embedded outpost runs inside the platform's own server pods.
        let selector = if ctx.outpost.embedded {
            [
                ("app.kubernetes.io/component", "server"),
                ("app.kubernetes.io/name", "authentik"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
        } else {
            meta::selector_labels(ctx)
        };

        Service {
            metadata: meta::object_meta(ctx, None),
            spec: Some(ServiceSpec {
                ports: Some(ports),
                selector: Some(selector),
                type_: Some(ctx.config().kubernetes_service_type.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn compare(&self, current: &Service, reference: &Service, _: &Context) -> Trigger {
        let (Some(current), Some(reference)) = (current.spec.as_ref(), reference.spec.as_ref())
        else {
            return Trigger::Update;
        };

        let current_ports = current.ports.as_deref().unwrap_or_default();
        let reference_ports = reference.ports.as_deref().unwrap_or_default();
        if current_ports.len() != reference_ports.len()
            || !reference_ports
                .iter()
                .all(|r| current_ports.iter().any(|c| same_port(c, r)))
        {
            tracing::debug!("Ports differ");
            return Trigger::Update;
        }

        if current.selector != reference.selector {
            tracing::debug!("Selector differs");
            return Trigger::Update;
        }
        Trigger::update_if(current.type_ != reference.type_)
    }
}

fn same_port(current: &ServicePort, reference: &ServicePort) -> bool {
    let protocol = |p: &ServicePort| p.protocol.clone().unwrap_or_else(|| "TCP".to_string());
    current.name == reference.name
        && current.port == reference.port
        && protocol(current) == protocol(reference)
        && current.target_port == reference.target_port
}
