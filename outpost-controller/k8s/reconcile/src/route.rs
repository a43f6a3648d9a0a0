//! Gateway API routes to the outpost's Service.
//!
//! References spell out every field the API server would otherwise default,
//! so a route read back from the cluster compares equal to its reference.

use crate::{
    meta,
    reconciler::{Context, Reconciler, Trigger},
};
use outpost_controller_core::{
    profile::METRICS_PORT, Component, DeploymentPort, ParentRef, Protocol, OUTPOST_PATH_PREFIX,
};
use outpost_controller_k8s_api::gateway;
use serde::Serialize;

pub(crate) struct HttpRouteReconciler;

pub(crate) struct TcpRouteReconciler;

pub(crate) struct UdpRouteReconciler;

const GATEWAY_KIND: &str = "Gateway";
const SERVICE_KIND: &str = "Service";
const HTTP_PORT: i32 = 9000;

/// Values are compared through their JSON form, which treats absent and
/// explicitly null fields alike.
fn differs<T: Serialize>(current: &T, reference: &T) -> bool {
    serde_json::to_value(current).ok() != serde_json::to_value(reference).ok()
}

fn parent<T>(parent: &ParentRef, f: impl FnOnce(Parent) -> T) -> T {
    f(Parent {
        group: Some(parent.group.clone().unwrap_or_else(|| gateway::GROUP.to_string())),
        kind: Some(parent.kind.clone().unwrap_or_else(|| GATEWAY_KIND.to_string())),
        name: parent.name.clone(),
        namespace: parent.namespace.clone(),
        port: parent.port,
        section_name: parent.section_name.clone(),
    })
}

struct Parent {
    group: Option<String>,
    kind: Option<String>,
    name: String,
    namespace: Option<String>,
    port: Option<i32>,
    section_name: Option<String>,
}

/// The outpost's ports that can be routed with `protocol`.
fn routable(ctx: &Context, protocol: Protocol) -> impl Iterator<Item = &DeploymentPort> + '_ {
    ctx.ports
        .iter()
        .filter(move |p| p.protocol == protocol && **p != METRICS_PORT)
}

// === impl HttpRouteReconciler ===

impl Reconciler for HttpRouteReconciler {
    type Object = gateway::HTTPRoute;

    const COMPONENT: Component = Component::HttpRoute;
    const EXTENSION: bool = true;

    fn skip(&self, ctx: &Context) -> bool {
        ctx.config().kubernetes_httproute_parent_refs.is_empty()
    }

    fn reference(&self, ctx: &Context) -> gateway::HTTPRoute {
        let config = ctx.config();

        let mut hostnames = Vec::new();
        let mut rules = Vec::new();
        for provider in ctx.outpost.proxy_providers() {
            let Some(host) = provider.host() else {
                continue;
            };
            let path = if provider.mode.is_forward_auth() {
                OUTPOST_PATH_PREFIX
            } else {
                "/"
            };
            rules.push(gateway::HTTPRouteRules {
                matches: Some(vec![gateway::HTTPRouteRulesMatches {
                    path: Some(gateway::HTTPRouteRulesMatchesPath {
                        r#type: Some(gateway::HTTPRouteRulesMatchesPathType::PathPrefix),
                        value: Some(path.to_string()),
                    }),
                    headers: Some(vec![gateway::HTTPRouteRulesMatchesHeaders {
                        name: "Host".to_string(),
                        r#type: Some(gateway::HTTPRouteRulesMatchesHeadersType::Exact),
                        value: host.clone(),
                    }]),
                    ..Default::default()
                }]),
                backend_refs: Some(vec![gateway::HTTPRouteRulesBackendRefs {
                    group: Some(String::new()),
                    kind: Some(SERVICE_KIND.to_string()),
                    name: ctx.name.clone(),
                    port: Some(HTTP_PORT),
                    weight: Some(1),
                    ..Default::default()
                }]),
                ..Default::default()
            });
            hostnames.push(host);
        }
        hostnames.sort();
        hostnames.dedup();

        let parent_refs = config
            .kubernetes_httproute_parent_refs
            .iter()
            .map(|p| {
                parent(p, |p| gateway::HTTPRouteParentRefs {
                    group: p.group,
                    kind: p.kind,
                    name: p.name,
                    namespace: p.namespace,
                    port: p.port,
                    section_name: p.section_name,
                })
            })
            .collect();

        gateway::HTTPRoute {
            metadata: meta::object_meta(ctx, Some(config.kubernetes_httproute_annotations.clone())),
            spec: gateway::HTTPRouteSpec {
                parent_refs: Some(parent_refs),
                hostnames: Some(hostnames),
                rules: Some(rules),
            },
            status: None,
        }
    }

    fn compare(
        &self,
        current: &gateway::HTTPRoute,
        reference: &gateway::HTTPRoute,
        _: &Context,
    ) -> Trigger {
        let (current, reference) = (&current.spec, &reference.spec);
        Trigger::update_if(
            differs(&current.parent_refs, &reference.parent_refs)
                || differs(&current.hostnames, &reference.hostnames)
                || differs(&current.rules, &reference.rules),
        )
    }

    fn creatable(&self, reference: &gateway::HTTPRoute) -> bool {
        reference.spec.rules.as_ref().is_some_and(|r| !r.is_empty())
    }
}

// === impl TcpRouteReconciler ===

impl Reconciler for TcpRouteReconciler {
    type Object = gateway::TCPRoute;

    const COMPONENT: Component = Component::TcpRoute;
    const EXTENSION: bool = true;

    fn skip(&self, ctx: &Context) -> bool {
        ctx.config().kubernetes_tcproute_parent_refs.is_empty()
            || routable(ctx, Protocol::Tcp).next().is_none()
    }

    fn reference(&self, ctx: &Context) -> gateway::TCPRoute {
        let parent_refs = ctx
            .config()
            .kubernetes_tcproute_parent_refs
            .iter()
            .map(|p| {
                parent(p, |p| gateway::TCPRouteParentRefs {
                    group: p.group,
                    kind: p.kind,
                    name: p.name,
                    namespace: p.namespace,
                    port: p.port,
                    section_name: p.section_name,
                })
            })
            .collect();

        let rules = routable(ctx, Protocol::Tcp)
            .map(|port| gateway::TCPRouteRules {
                name: Some(port.name.to_string()),
                backend_refs: Some(vec![gateway::TCPRouteRulesBackendRefs {
                    group: Some(String::new()),
                    kind: Some(SERVICE_KIND.to_string()),
                    name: ctx.name.clone(),
                    namespace: None,
                    port: Some(port.port.into()),
                    weight: Some(1),
                }]),
            })
            .collect();

        gateway::TCPRoute {
            metadata: meta::object_meta(ctx, None),
            spec: gateway::TCPRouteSpec {
                parent_refs: Some(parent_refs),
                rules,
            },
            status: None,
        }
    }

    fn compare(
        &self,
        current: &gateway::TCPRoute,
        reference: &gateway::TCPRoute,
        _: &Context,
    ) -> Trigger {
        let (current, reference) = (&current.spec, &reference.spec);
        Trigger::update_if(
            differs(&current.parent_refs, &reference.parent_refs)
                || differs(&current.rules, &reference.rules),
        )
    }
}

// === impl UdpRouteReconciler ===

impl Reconciler for UdpRouteReconciler {
    type Object = gateway::UDPRoute;

    const COMPONENT: Component = Component::UdpRoute;
    const EXTENSION: bool = true;

    fn skip(&self, ctx: &Context) -> bool {
        ctx.config().kubernetes_udproute_parent_refs.is_empty()
            || routable(ctx, Protocol::Udp).next().is_none()
    }

    fn reference(&self, ctx: &Context) -> gateway::UDPRoute {
        let parent_refs = ctx
            .config()
            .kubernetes_udproute_parent_refs
            .iter()
            .map(|p| {
                parent(p, |p| gateway::UDPRouteParentRefs {
                    group: p.group,
                    kind: p.kind,
                    name: p.name,
                    namespace: p.namespace,
                    port: p.port,
                    section_name: p.section_name,
                })
            })
            .collect();

        let rules = routable(ctx, Protocol::Udp)
            .map(|port| gateway::UDPRouteRules {
                name: Some(port.name.to_string()),
                backend_refs: Some(vec![gateway::UDPRouteRulesBackendRefs {
                    group: Some(String::new()),
                    kind: Some(SERVICE_KIND.to_string()),
                    name: ctx.name.clone(),
                    namespace: None,
                    port: Some(port.port.into()),
                    weight: Some(1),
                }]),
            })
            .collect();

        gateway::UDPRoute {
            metadata: meta::object_meta(ctx, None),
            spec: gateway::UDPRouteSpec {
                parent_refs: Some(parent_refs),
                rules,
            },
            status: None,
        }
    }

    fn compare(
        &self,
        current: &gateway::UDPRoute,
        reference: &gateway::UDPRoute,
        _: &Context,
    ) -> Trigger {
        let (current, reference) = (&current.spec, &reference.spec);
        Trigger::update_if(
            differs(&current.parent_refs, &reference.parent_refs)
                || differs(&current.rules, &reference.rules),
        )
    }
}
