//! What each outpost type contributes to its controller.

use crate::{DeploymentPort, OutpostType, Protocol};
use std::fmt;

/// Port the outpost serves Prometheus metrics on.
pub const METRICS_PORT: DeploymentPort = DeploymentPort::new(9300, "http-metrics", Protocol::Tcp);

/// A kind of object the Kubernetes controller converges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Secret,
    Deployment,
    Service,
    Ingress,
    HttpRoute,
    TcpRoute,
    UdpRoute,
    TraefikMiddleware,
    ServiceMonitor,
}

/// Ports and reconcilers contributed by one outpost type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub ports: Vec<DeploymentPort>,
    /// Whether the outpost exposes `METRICS_PORT` on Kubernetes.
    pub metrics: bool,
    pub extra_components: Vec<Component>,
    pub removed_components: Vec<Component>,
}

const BASE_ORDER: [Component; 4] = [
    Component::Secret,
    Component::Deployment,
    Component::Service,
    Component::ServiceMonitor,
];

// === impl Component ===

impl Component {
    /// The identifier operators use to disable or patch a component.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::Deployment => "deployment",
            Self::Service => "service",
            Self::Ingress => "ingress",
            Self::HttpRoute => "httproute",
            Self::TcpRoute => "tcproute",
            Self::UdpRoute => "udproute",
            Self::TraefikMiddleware => "traefik middleware",
            Self::ServiceMonitor => "prometheus servicemonitor",
        }
    }

    /// Heading for this component's block of captured log lines.
    pub fn title(&self) -> String {
        self.as_str()
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Profile ===

impl Profile {
    pub fn for_type(kind: OutpostType) -> Self {
        use Component::*;
        use Protocol::*;

        match kind {
            OutpostType::Proxy => Self {
                ports: vec![
                    DeploymentPort::new(9000, "http", Tcp),
                    DeploymentPort::new(9443, "https", Tcp),
                ],
                metrics: true,
                extra_components: vec![Ingress, HttpRoute, TraefikMiddleware],
                removed_components: vec![],
            },
            OutpostType::Ldap => Self {
                ports: vec![
                    DeploymentPort::with_inner(389, "ldap", Tcp, 3389),
                    DeploymentPort::with_inner(636, "ldaps", Tcp, 6636),
                ],
                metrics: true,
                extra_components: vec![TcpRoute],
                removed_components: vec![],
            },
            OutpostType::Radius => Self {
                ports: vec![DeploymentPort::new(1812, "radius", Udp)],
                metrics: true,
                extra_components: vec![UdpRoute],
                removed_components: vec![],
            },
            OutpostType::Kerberos => Self {
                ports: vec![
                    DeploymentPort::with_inner(88, "kerberos-tcp", Tcp, 8888),
                    DeploymentPort::with_inner(88, "kerberos-udp", Udp, 8888),
                ],
                metrics: true,
                extra_components: vec![TcpRoute, UdpRoute],
                removed_components: vec![],
            },
            OutpostType::Rac | OutpostType::Scim => Self {
                ports: vec![],
                metrics: false,
                extra_components: vec![],
                removed_components: vec![Service, ServiceMonitor],
            },
        }
    }

    /// Ports published on Docker, where metrics stay private to the host.
    pub fn docker_ports(&self) -> Vec<DeploymentPort> {
        self.ports.clone()
    }

    pub fn kubernetes_ports(&self) -> Vec<DeploymentPort> {
        let mut ports = self.ports.clone();
        if self.metrics {
            ports.push(METRICS_PORT);
        }
        ports
    }

    /// Components in the order they are converged.
    ///
    /// Extra components go after the Service they route to and before the
    /// ServiceMonitor.
    pub fn reconcile_order(&self) -> Vec<Component> {
        let mut order = BASE_ORDER
            .into_iter()
            .filter(|c| !self.removed_components.contains(c))
            .collect::<Vec<_>>();
        let at = order
            .iter()
            .position(|c| *c == Component::ServiceMonitor)
            .unwrap_or(order.len());
        order.splice(at..at, self.extra_components.iter().copied());
        order
    }
}
