use crate::{
    meta,
    reconciler::{Context, Reconciler, Trigger},
};
use outpost_controller_core::{profile::METRICS_PORT, Component};
use outpost_controller_k8s_api::monitoring::{
    Endpoint, Selector, ServiceMonitor, ServiceMonitorSpec,
};

/// Has the Prometheus operator scrape the outpost's metrics port.
pub(crate) struct ServiceMonitorReconciler;

impl Reconciler for ServiceMonitorReconciler {
    type Object = ServiceMonitor;

    const COMPONENT: Component = Component::ServiceMonitor;
    const EXTENSION: bool = true;

    fn skip(&self, ctx: &Context) -> bool {
        ctx.outpost.embedded || !ctx.ports.contains(&METRICS_PORT)
    }

    fn reference(&self, ctx: &Context) -> ServiceMonitor {
        ServiceMonitor {
            metadata: meta::object_meta(ctx, None),
            spec: ServiceMonitorSpec {
                endpoints: vec![Endpoint {
                    port: METRICS_PORT.name.to_string(),
                    path: Some("/metrics".to_string()),
                }],
                selector: Selector {
                    match_labels: meta::labels(ctx),
                },
            },
        }
    }

    fn compare(&self, current: &ServiceMonitor, reference: &ServiceMonitor, _: &Context) -> Trigger {
        Trigger::update_if(current.spec != reference.spec)
    }
}
