use crate::{
    engine::{Container, ContainerSpec, Engine},
    transport::{DaemonUrl, InlineTls, SshTunnel},
};
use anyhow::Result;
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
        RemoveContainerOptions, RestartContainerOptions, StartContainerOptions,
    },
    errors::Error as DockerError,
    image::CreateImageOptions,
    models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum},
    Docker, API_DEFAULT_VERSION,
};
use futures::TryStreamExt;
use outpost_controller_core::{ControllerError, DockerConnection};
use std::collections::HashMap;
use tracing::debug;

/// Seconds before a request to the daemon times out.
const TIMEOUT_SECS: u64 = 120;

/// A Docker Engine reached through bollard.
///
/// Owns any credential files and tunnel the connection needs; they are
/// removed when the engine is dropped.
pub struct DockerEngine {
    docker: Docker,
    _tls: Option<InlineTls>,
    _tunnel: Option<SshTunnel>,
}

fn is_not_found(error: &DockerError) -> bool {
    matches!(
        error,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

// === impl DockerEngine ===

impl DockerEngine {
    /// Connects to the daemon and checks that it responds.
    pub async fn connect(connection: &DockerConnection) -> Result<Self, ControllerError> {
        let engine = Self::open(connection)
            .await
            .map_err(ControllerError::invalid_connection)?;
        engine
            .docker
            .ping()
            .await
            .map_err(ControllerError::invalid_connection)?;
        Ok(engine)
    }

    async fn open(connection: &DockerConnection) -> Result<Self> {
        if connection.local {
            return Ok(Self::new(Docker::connect_with_local_defaults()?));
        }

        match DaemonUrl::parse(&connection.url)? {
            DaemonUrl::Unix(path) => Ok(Self::new(Docker::connect_with_unix(
                &path,
                TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?)),

            DaemonUrl::Tcp { host, port } => {
                let addr = format!("tcp://{host}:{port}");
                match (&connection.tls_verification, &connection.tls_authentication) {
                    (Some(verification), Some(authentication)) => {
                        let tls = InlineTls::write(verification, authentication)?;
                        let docker = Docker::connect_with_ssl(
                            &addr,
                            &tls.key(),
                            &tls.cert(),
                            &tls.ca(),
                            TIMEOUT_SECS,
                            API_DEFAULT_VERSION,
                        )?;
                        Ok(Self {
                            docker,
                            _tls: Some(tls),
                            _tunnel: None,
                        })
                    }
                    (None, None) => Ok(Self::new(Docker::connect_with_http(
                        &addr,
                        TIMEOUT_SECS,
                        API_DEFAULT_VERSION,
                    )?)),
                    _ => anyhow::bail!(
                        "TLS requires both a verification and an authentication certificate"
                    ),
                }
            }

            DaemonUrl::Ssh(target) => {
                let tunnel =
                    SshTunnel::open(&target, connection.tls_authentication.as_ref()).await?;
                let socket = tunnel.socket().to_string_lossy().into_owned();
                let docker = Docker::connect_with_unix(&socket, TIMEOUT_SECS, API_DEFAULT_VERSION)?;
                Ok(Self {
                    docker,
                    _tls: None,
                    _tunnel: Some(tunnel),
                })
            }
        }
    }

    fn new(docker: Docker) -> Self {
        Self {
            docker,
            _tls: None,
            _tunnel: None,
        }
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn inspect(&self, name: &str) -> Result<Option<Container>> {
        let details = match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(error) if is_not_found(&error) => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let image_tags = match details.image.as_deref() {
            Some(image) => match self.docker.inspect_image(image).await {
                Ok(image) => image.repo_tags.unwrap_or_default(),
                Err(error) if is_not_found(&error) => vec![],
                Err(error) => return Err(error.into()),
            },
            None => vec![],
        };

        let config = details.config.unwrap_or_default();
        let host = details.host_config.unwrap_or_default();
        let state = details.state.unwrap_or_default();
        let port_bindings = host
            .port_bindings
            .unwrap_or_default()
            .into_iter()
            .map(|(port, bindings)| {
                let host_ports = bindings
                    .into_iter()
                    .flatten()
                    .filter_map(|b| b.host_port)
                    .collect();
                (port, host_ports)
            })
            .collect();

        Ok(Some(Container {
            image_tags,
            env: config.env.unwrap_or_default(),
            labels: config.labels.unwrap_or_default().into_iter().collect(),
            port_bindings,
            restart_policy: host
                .restart_policy
                .and_then(|p| p.name)
                .map(|n| n.to_string()),
            network_mode: host.network_mode,
            running: state.running.unwrap_or(false),
            health: state
                .health
                .and_then(|h| h.status)
                .map(|s| s.to_string()),
        }))
    }

    async fn pull(&self, image: &str) -> Result<()> {
        debug!(%image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<()> {
        let exposed_ports = spec
            .ports
            .keys()
            .map(|port| (port.clone(), HashMap::new()))
            .collect::<HashMap<_, _>>();
        let port_bindings = spec
            .ports
            .iter()
            .map(|(port, host_port)| {
                let binding = PortBinding {
                    host_ip: None,
                    host_port: Some(host_port.to_string()),
                };
                (port.clone(), Some(vec![binding]))
            })
            .collect::<HashMap<_, _>>();

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(
                spec.env
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect(),
            ),
            labels: Some(spec.labels.clone().into_iter().collect()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
                restart_policy: Some(RestartPolicy {
                    name: Some(restart_policy(spec.restart_policy)),
                    maximum_retry_count: None,
                }),
                network_mode: spec.network.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };
        self.docker.create_container(Some(options), config).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.docker
            .restart_container(name, None::<RestartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<()> {
        self.docker
            .kill_container(name, None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Err(error) if is_not_found(&error) => Ok(()),
            result => Ok(result?),
        }
    }

    async fn version(&self) -> Result<String> {
        let version = self.docker.version().await?;
        Ok(version.version.unwrap_or_default())
    }
}

fn restart_policy(name: &str) -> RestartPolicyNameEnum {
    match name {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        "no" => RestartPolicyNameEnum::NO,
        _ => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}
