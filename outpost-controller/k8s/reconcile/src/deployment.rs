use crate::{
    meta,
    reconciler::{Context, Reconciler, Trigger},
};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EnvFromSource, EnvVar, EnvVarSource,
    LocalObjectReference, PodSecurityContext, PodSpec, PodTemplateSpec, SeccompProfile,
    SecretEnvSource, SecretKeySelector, SecretVolumeSource, SecurityContext, Volume, VolumeMount,
};
use outpost_controller_core::Component;
use outpost_controller_k8s_api::{Deployment, DeploymentSpec, LabelSelector, ObjectMeta};
use tracing::warn;

/// Runs the outpost process.
pub(crate) struct DeploymentReconciler;

/// Environment variables and the Secret keys they are read from.
const ENV: [(&str, &str); 4] = [
    ("AUTHENTIK_HOST", "authentik_host"),
    ("AUTHENTIK_HOST_BROWSER", "authentik_host_browser"),
    ("AUTHENTIK_TOKEN", "token"),
    ("AUTHENTIK_INSECURE", "authentik_host_insecure"),
];

impl Reconciler for DeploymentReconciler {
    type Object = Deployment;

    const COMPONENT: Component = Component::Deployment;

    fn skip(&self, ctx: &Context) -> bool {
        ctx.outpost.embedded
    }

    fn reference(&self, ctx: &Context) -> Deployment {
        let config = ctx.config();
        let selector = meta::selector_labels(ctx);

        let mut pod_labels = meta::labels(ctx);
        pod_labels.extend(selector.clone());

        let ports = ctx
            .ports
            .iter()
            .map(|p| ContainerPort {
                name: Some(p.name.to_string()),
                container_port: p.container_port().into(),
                protocol: Some(p.protocol.as_k8s_str().to_string()),
                ..Default::default()
            })
            .collect();

        let env = ENV
            .iter()
            .map(|(name, key)| EnvVar {
                name: name.to_string(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: ctx.name.clone(),
                        key: key.to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();

        let image_pull_secrets = config
            .kubernetes_image_pull_secrets
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect::<Vec<_>>();

        let env_from = match config.postgresql_secret() {
            Some(secret) => vec![EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: secret.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            None if config.postgres_sessions() => {
                warn!("Sessions are stored in Postgres but kubernetes_postgresql_secret_name is empty");
                vec![]
            }
            None => vec![],
        };

        let (volumes, volume_mounts) = match &ctx.credential_files {
            Some(files) => (
                vec![Volume {
                    name: files.volume.clone(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(files.secret.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                vec![VolumeMount {
                    name: files.volume.clone(),
                    mount_path: files.mount_path.clone(),
                    read_only: Some(true),
                    ..Default::default()
                }],
            ),
            None => (vec![], vec![]),
        };

        Deployment {
            metadata: meta::object_meta(ctx, None),
            spec: Some(DeploymentSpec {
                replicas: Some(config.kubernetes_replicas),
                selector: LabelSelector {
                    match_labels: Some(selector),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        image_pull_secrets: (!image_pull_secrets.is_empty())
                            .then_some(image_pull_secrets),
                        security_context: Some(PodSecurityContext {
                            seccomp_profile: Some(SeccompProfile {
                                type_: "RuntimeDefault".to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        volumes: (!volumes.is_empty()).then_some(volumes),
                        containers: vec![Container {
                            name: ctx.outpost.kind.to_string(),
                            image: Some(ctx.image.clone()),
                            ports: Some(ports),
                            env: Some(env),
                            env_from: (!env_from.is_empty()).then_some(env_from),
                            volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
                            security_context: Some(SecurityContext {
                                run_as_non_root: Some(true),
                                allow_privilege_escalation: Some(false),
                                capabilities: Some(Capabilities {
                                    drop: Some(vec!["ALL".to_string()]),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn compare(&self, current: &Deployment, reference: &Deployment, _: &Context) -> Trigger {
        let replicas = |d: &Deployment| d.spec.as_ref().and_then(|s| s.replicas);
        if replicas(current) != replicas(reference) {
            tracing::debug!("Replica count differs");
            return Trigger::Update;
        }
        if volumes(current) != volumes(reference) {
            tracing::debug!("Volumes differ");
            return Trigger::Update;
        }

        let (Some(current), Some(reference)) = (container(current), container(reference)) else {
            return Trigger::Update;
        };
        if current.image != reference.image {
            tracing::debug!("Image differs");
            return Trigger::Update;
        }
        if env_from(current) != env_from(reference) {
            tracing::debug!("Environment sources differ");
            return Trigger::Update;
        }
        if volume_mounts(current) != volume_mounts(reference) {
            tracing::debug!("Volume mounts differ");
            return Trigger::Update;
        }
        Trigger::update_if(ports(current) != ports(reference))
    }
}

fn container(deployment: &Deployment) -> Option<&Container> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()
}

/// Secret-backed volumes as `(name, secret)`, ignoring the modes the
/// server fills in.
fn volumes(deployment: &Deployment) -> Vec<(&str, Option<&str>)> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.volumes.as_ref())
        .into_iter()
        .flatten()
        .map(|v| {
            let secret = v.secret.as_ref().and_then(|s| s.secret_name.as_deref());
            (v.name.as_str(), secret)
        })
        .collect()
}

fn env_from(container: &Container) -> Vec<Option<&str>> {
    container
        .env_from
        .iter()
        .flatten()
        .map(|e| e.secret_ref.as_ref().map(|s| s.name.as_str()))
        .collect()
}

fn volume_mounts(container: &Container) -> Vec<(&str, &str, bool)> {
    container
        .volume_mounts
        .iter()
        .flatten()
        .map(|m| {
            (
                m.name.as_str(),
                m.mount_path.as_str(),
                m.read_only.unwrap_or(false),
            )
        })
        .collect()
}

/// Sorted `(name, protocol, port)` tuples, with the server's protocol
/// default filled in.
fn ports(container: &Container) -> Vec<(Option<&str>, &str, i32)> {
    let mut ports = container
        .ports
        .iter()
        .flatten()
        .map(|p| {
            (
                p.name.as_deref(),
                p.protocol.as_deref().unwrap_or("TCP"),
                p.container_port,
            )
        })
        .collect::<Vec<_>>();
    ports.sort_unstable();
    ports
}
