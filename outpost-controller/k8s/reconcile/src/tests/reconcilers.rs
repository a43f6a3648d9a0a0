use super::*;
use crate::{
    deployment::DeploymentReconciler,
    ingress::IngressReconciler,
    meta,
    reconciler::{Context, Reconciler, Trigger},
    database::CredentialFiles,
    route::{HttpRouteReconciler, TcpRouteReconciler, UdpRouteReconciler},
    secret::SecretReconciler,
    service::ServiceReconciler,
};
use outpost_controller_core::ParentRef;
use outpost_controller_k8s_api::{ByteString, IntOrString};
use pretty_assertions::assert_eq;

fn context(outpost: Outpost) -> Context {
    let ports = Profile::for_type(outpost.kind).kubernetes_ports();
    Context::new(Arc::new(outpost), &platform(), ports)
}

#[test]
fn triggers_are_ordered_by_severity() {
    assert!(Trigger::NoChange < Trigger::Update);
    assert!(Trigger::Update < Trigger::Recreate);
    assert_eq!(Trigger::Update.max(Trigger::NoChange), Trigger::Update);
    assert_eq!(Trigger::update_if(false), Trigger::NoChange);
}

#[test]
fn secret_detects_changed_token() {
    let ctx = context(outpost(OutpostType::Ldap));
    let reference = SecretReconciler.reference(&ctx);
    assert_eq!(
        SecretReconciler.compare(&reference, &reference, &ctx),
        Trigger::NoChange
    );

    let mut current = reference.clone();
    current
        .data
        .as_mut()
        .expect("data")
        .insert("token".to_string(), ByteString(b"rotated".to_vec()));
    assert_eq!(
        SecretReconciler.compare(&current, &reference, &ctx),
        Trigger::Update
    );

    current.data.as_mut().expect("data").remove("token");
    assert_eq!(
        SecretReconciler.compare(&current, &reference, &ctx),
        Trigger::Update
    );
}

#[test]
fn deployment_selector_survives_rename() {
    let ctx = context(outpost(OutpostType::Ldap));
    let renamed = context(Outpost {
        name: "Directory Gateway".to_string(),
        ..outpost(OutpostType::Ldap)
    });
    assert_ne!(ctx.name, renamed.name);

    let selector = |ctx: &Context| {
        DeploymentReconciler
            .reference(ctx)
            .spec
            .expect("spec")
            .selector
            .match_labels
    };
    assert_eq!(selector(&ctx), selector(&renamed));
}

#[test]
fn deployment_binds_inner_ports_and_reads_the_secret() {
    let ctx = context(outpost(OutpostType::Ldap));
    let deployment = DeploymentReconciler.reference(&ctx);
    let pod = deployment.spec.expect("spec").template.spec.expect("pod");
    let container = &pod.containers[0];

    let ports = container
        .ports
        .iter()
        .flatten()
        .map(|p| (p.name.clone().unwrap_or_default(), p.container_port))
        .collect::<Vec<_>>();
    assert_eq!(
        ports,
        vec![
            ("ldap".to_string(), 3389),
            ("ldaps".to_string(), 6636),
            ("http-metrics".to_string(), 9300),
        ]
    );

    let env = container.env.as_ref().expect("env");
    assert!(env.iter().all(|e| {
        e.value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .is_some_and(|s| s.name == ctx.name)
    }));
    assert_eq!(
        container.image.as_deref(),
        Some("ghcr.io/goauthentik/ldap:2025.2.1")
    );
}

#[test]
fn service_detects_port_changes() {
    let ctx = context(outpost(OutpostType::Ldap));
    let reference = ServiceReconciler.reference(&ctx);
    assert_eq!(
        ServiceReconciler.compare(&reference, &reference, &ctx),
        Trigger::NoChange
    );

    let mut fewer = reference.clone();
    fewer.spec.as_mut().expect("spec").ports.as_mut().expect("ports").pop();
    assert_eq!(
        ServiceReconciler.compare(&fewer, &reference, &ctx),
        Trigger::Update
    );

    let mut moved = reference.clone();
    moved.spec.as_mut().expect("spec").ports.as_mut().expect("ports")[0].target_port =
        Some(IntOrString::Int(389));
    assert_eq!(
        ServiceReconciler.compare(&moved, &reference, &ctx),
        Trigger::Update
    );
}

#[test]
fn ingress_without_hosts() {
    let ctx = context(proxy_outpost());
    let reference = IngressReconciler.reference(&ctx);
    assert!(IngressReconciler.creatable(&reference));

    let mut current = reference.clone();
    current.spec.as_mut().expect("spec").rules = Some(vec![]);
    assert_eq!(
        IngressReconciler.compare(&current, &reference, &ctx),
        Trigger::Recreate
    );

    let empty = IngressReconciler.reference(&context(outpost(OutpostType::Proxy)));
    assert!(!IngressReconciler.creatable(&empty));
}

#[test]
fn ingress_routes_forward_auth_to_outpost_paths() {
    let ctx = context(proxy_outpost());
    let spec = IngressReconciler.reference(&ctx).spec.expect("spec");

    let paths = spec
        .rules
        .iter()
        .flatten()
        .map(|r| {
            let path = &r.http.as_ref().expect("http").paths[0];
            (r.host.clone().unwrap_or_default(), path.path.clone().unwrap_or_default())
        })
        .collect::<Vec<_>>();
    assert_eq!(
        paths,
        vec![
            ("grafana.example.com".to_string(), "/".to_string()),
            ("apps.example.com".to_string(), "/outpost.goauthentik.io".to_string()),
        ]
    );

    let tls = spec.tls.expect("tls");
    assert_eq!(tls.len(), 1);
    assert_eq!(tls[0].hosts, Some(vec!["grafana.example.com".to_string()]));
    assert_eq!(tls[0].secret_name.as_deref(), Some("authentik-outpost-tls"));
}

#[test]
fn operator_annotations_extend_defaults() {
    let mut outpost = proxy_outpost();
    outpost.config.kubernetes_ingress_annotations.insert(
        "cert-manager.io/cluster-issuer".to_string(),
        "letsencrypt".to_string(),
    );
    let ctx = context(outpost);
    let reference = IngressReconciler.reference(&ctx);
    let annotations = reference.metadata.annotations.clone().expect("annotations");
    assert_eq!(annotations["cert-manager.io/cluster-issuer"], "letsencrypt");
    assert_eq!(annotations["nginx.ingress.kubernetes.io/affinity"], "cookie");

    // Without the operator's annotation the live object needs an update.
    let mut current = reference.clone();
    current
        .metadata
        .annotations
        .as_mut()
        .expect("annotations")
        .remove("cert-manager.io/cluster-issuer");
    assert!(!meta::contains(&current.metadata, &reference.metadata));
}

#[test]
fn http_route_matches_each_host() {
    let mut outpost = proxy_outpost();
    outpost.config.kubernetes_httproute_parent_refs = vec![ParentRef {
        name: "public".to_string(),
        ..Default::default()
    }];
    let ctx = context(outpost);
    let route = HttpRouteReconciler.reference(&ctx);

    assert_eq!(
        route.spec.hostnames,
        Some(vec![
            "apps.example.com".to_string(),
            "grafana.example.com".to_string()
        ])
    );
    let parents = route.spec.parent_refs.clone().expect("parents");
    assert_eq!(parents[0].group.as_deref(), Some("gateway.networking.k8s.io"));
    assert_eq!(parents[0].kind.as_deref(), Some("Gateway"));
    assert_eq!(route.spec.rules.as_ref().map(Vec::len), Some(2));

    let mut current = route.clone();
    current.spec.hostnames = Some(vec!["apps.example.com".to_string()]);
    assert_eq!(
        HttpRouteReconciler.compare(&current, &route, &ctx),
        Trigger::Update
    );
    assert_eq!(
        HttpRouteReconciler.compare(&route, &route, &ctx),
        Trigger::NoChange
    );
}

#[test]
fn tcp_route_skips_metrics() {
    let mut outpost = outpost(OutpostType::Ldap);
    assert!(TcpRouteReconciler.skip(&context(outpost.clone())));

    outpost.config.kubernetes_tcproute_parent_refs = vec![ParentRef {
        name: "ldap-gateway".to_string(),
        section_name: Some("ldaps".to_string()),
        ..Default::default()
    }];
    let ctx = context(outpost);
    assert!(!TcpRouteReconciler.skip(&ctx));

    let route = TcpRouteReconciler.reference(&ctx);
    let ports = route
        .spec
        .rules
        .iter()
        .flat_map(|r| r.backend_refs.iter().flatten())
        .map(|b| b.port)
        .collect::<Vec<_>>();
    assert_eq!(ports, vec![Some(389), Some(636)]);
}

#[test]
fn udp_route_targets_each_udp_port() {
    let mut outpost = outpost(OutpostType::Kerberos);
    assert!(UdpRouteReconciler.skip(&context(outpost.clone())));

    outpost.config.kubernetes_udproute_parent_refs = vec![ParentRef {
        name: "udp-gateway".to_string(),
        namespace: Some("gateways".to_string()),
        ..Default::default()
    }];
    // TCP parents must not leak into the UDP route.
    outpost.config.kubernetes_tcproute_parent_refs = vec![ParentRef {
        name: "tcp-gateway".to_string(),
        ..Default::default()
    }];
    let ctx = context(outpost);
    assert!(!UdpRouteReconciler.skip(&ctx));

    let route = UdpRouteReconciler.reference(&ctx);
    let parents = route.spec.parent_refs.clone().expect("parents");
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].name, "udp-gateway");
    assert_eq!(parents[0].namespace.as_deref(), Some("gateways"));
    assert_eq!(parents[0].kind.as_deref(), Some("Gateway"));

    let backends = route
        .spec
        .rules
        .iter()
        .flat_map(|r| r.backend_refs.iter().flatten())
        .map(|b| (b.name.as_str(), b.port))
        .collect::<Vec<_>>();
    assert_eq!(backends, vec![(ctx.name.as_str(), Some(88))]);
    assert_eq!(
        route.spec.rules[0].name.as_deref(),
        Some("kerberos-udp")
    );

    assert_eq!(
        UdpRouteReconciler.compare(&route, &route, &ctx),
        Trigger::NoChange
    );
    let mut current = route.clone();
    current.spec.parent_refs = None;
    assert_eq!(
        UdpRouteReconciler.compare(&current, &route, &ctx),
        Trigger::Update
    );
}

#[test]
fn udp_route_skips_tcp_only_outposts() {
    let mut outpost = outpost(OutpostType::Ldap);
    outpost.config.kubernetes_udproute_parent_refs = vec![ParentRef {
        name: "udp-gateway".to_string(),
        ..Default::default()
    }];
    assert!(UdpRouteReconciler.skip(&context(outpost)));
}

#[test]
fn deployment_compares_database_mounts() {
    let mut outpost = outpost(OutpostType::Ldap);
    outpost.config.session_backend = "postgresql".to_string();
    outpost.config.kubernetes_postgresql_secret_name = "pg-settings".to_string();
    let mut ctx = context(outpost);
    let without_files = DeploymentReconciler.reference(&ctx);

    ctx.credential_files = Some(CredentialFiles {
        secret: "pg-creds".to_string(),
        mount_path: "/postgres-creds".to_string(),
        volume: "postgres-creds".to_string(),
    });
    let reference = DeploymentReconciler.reference(&ctx);
    assert_eq!(
        DeploymentReconciler.compare(&without_files, &reference, &ctx),
        Trigger::Update
    );

    // Modes the server fills in are not drift.
    let mut current = reference.clone();
    let pod = current.spec.as_mut().expect("spec").template.spec.as_mut().expect("pod");
    pod.volumes.as_mut().expect("volumes")[0]
        .secret
        .as_mut()
        .expect("secret volume")
        .default_mode = Some(0o644);
    assert_eq!(
        DeploymentReconciler.compare(&current, &reference, &ctx),
        Trigger::NoChange
    );

    let pod = current.spec.as_mut().expect("spec").template.spec.as_mut().expect("pod");
    pod.containers[0].volume_mounts.as_mut().expect("mounts")[0].read_only = None;
    assert_eq!(
        DeploymentReconciler.compare(&current, &reference, &ctx),
        Trigger::Update
    );

    let mut other_settings = reference.clone();
    let pod = other_settings.spec.as_mut().expect("spec").template.spec.as_mut().expect("pod");
    pod.containers[0].env_from = None;
    assert_eq!(
        DeploymentReconciler.compare(&other_settings, &reference, &ctx),
        Trigger::Update
    );
}
