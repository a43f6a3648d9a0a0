use crate::{
    meta,
    reconciler::{Context, Reconciler, Trigger},
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule, IngressServiceBackend,
    IngressTLS, ServiceBackendPort,
};
use outpost_controller_core::{Component, OUTPOST_PATH_PREFIX};
use outpost_controller_k8s_api::{Ingress, IngressSpec};
use std::collections::BTreeSet;

/// Routes each proxy provider's external host to the outpost.
pub(crate) struct IngressReconciler;

/// Keeps a browser's session on one outpost replica.
const DEFAULT_ANNOTATIONS: [(&str, &str); 5] = [
    ("nginx.ingress.kubernetes.io/affinity", "cookie"),
    ("nginx.ingress.kubernetes.io/proxy-buffer-size", "16k"),
    ("nginx.ingress.kubernetes.io/proxy-buffers-number", "4"),
    ("traefik.ingress.kubernetes.io/affinity", "true"),
    ("traefik.ingress.kubernetes.io/router.tls", "true"),
];

impl Reconciler for IngressReconciler {
    type Object = Ingress;

    const COMPONENT: Component = Component::Ingress;

    fn reference(&self, ctx: &Context) -> Ingress {
        let config = ctx.config();

        let mut annotations = DEFAULT_ANNOTATIONS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<meta::Labels>();
        annotations.extend(config.kubernetes_ingress_annotations.clone());

        let mut rules = Vec::new();
        let mut tls_hosts = Vec::new();
        for provider in ctx.outpost.proxy_providers() {
            let Some(host) = provider.host() else {
                continue;
            };
            if provider.is_tls() {
                tls_hosts.push(host.clone());
            }

            // Forward-auth providers are only asked for the outpost's own
            // endpoints; everything else is proxied.
            let path = if provider.mode.is_forward_auth() {
                OUTPOST_PATH_PREFIX
            } else {
                "/"
            };
            rules.push(IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(path.to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: ctx.name.clone(),
                                port: Some(ServiceBackendPort {
                                    name: Some("http".to_string()),
                                    number: None,
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            });
        }

        let tls = (!tls_hosts.is_empty()).then(|| {
            vec![IngressTLS {
                hosts: Some(tls_hosts),
                secret_name: Some(config.kubernetes_ingress_secret_name.clone()),
            }]
        });

        Ingress {
            metadata: meta::object_meta(ctx, Some(annotations)),
            spec: Some(IngressSpec {
                ingress_class_name: config.kubernetes_ingress_class_name.clone(),
                rules: Some(rules),
                tls,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn compare(&self, current: &Ingress, reference: &Ingress, _: &Context) -> Trigger {
        let current_hosts = rule_hosts(current);
        if current_hosts.is_empty() {
            tracing::debug!("Ingress has no hosts");
            return Trigger::Recreate;
        }
        if current_hosts != rule_hosts(reference) {
            tracing::debug!("Hosts differ");
            return Trigger::Update;
        }
        if tls(current) != tls(reference) {
            tracing::debug!("TLS hosts differ");
            return Trigger::Update;
        }
        let class = |i: &Ingress| i.spec.as_ref().and_then(|s| s.ingress_class_name.clone());
        Trigger::update_if(class(reference).is_some() && class(current) != class(reference))
    }

    fn creatable(&self, reference: &Ingress) -> bool {
        !rule_hosts(reference).is_empty()
    }
}

fn rule_hosts(ingress: &Ingress) -> BTreeSet<&str> {
    ingress
        .spec
        .iter()
        .flat_map(|s| s.rules.iter().flatten())
        .filter_map(|r| r.host.as_deref())
        .collect()
}

fn tls(ingress: &Ingress) -> BTreeSet<(Option<&str>, &str)> {
    ingress
        .spec
        .iter()
        .flat_map(|s| s.tls.iter().flatten())
        .flat_map(|t| {
            t.hosts
                .iter()
                .flatten()
                .map(move |h| (t.secret_name.as_deref(), h.as_str()))
        })
        .collect()
}
