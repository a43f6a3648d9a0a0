use crate::{
    core::{
        ConnectionState, ControllerError, KubernetesConnection, Observe, Outpost, Platform,
        Profile, ServiceConnection,
    },
    docker::{DockerController, DockerEngine},
    k8s::KubernetesController,
    k8s_api::Client,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::sync::Arc;
use tracing::{debug, info};

/// The controller bound to an outpost's service connection.
pub enum Controller {
    /// The outpost has no service connection; nothing is deployed.
    Noop,
    Docker(DockerController<DockerEngine>),
    Kubernetes(KubernetesController<Client>),
}

// === impl Controller ===

impl Controller {
    /// Connects to the runtime described by `connection`.
    ///
    /// Fails before anything is reconciled if the runtime cannot be reached
    /// or its configuration is invalid.
    pub async fn connect(
        outpost: Arc<Outpost>,
        connection: Option<&ServiceConnection>,
        platform: Platform,
        observer: Arc<dyn Observe>,
    ) -> Result<Self, ControllerError> {
        let profile = Profile::for_type(outpost.kind);
        let Some(connection) = connection else {
            debug!(outpost = %outpost.name, "No service connection");
            return Ok(Self::Noop);
        };

        info!(outpost = %outpost.name, connection = %connection.name(), "Connecting");
        match connection {
            ServiceConnection::Docker(docker) => {
                let controller =
                    DockerController::connect(docker, outpost, platform, &profile, observer)
                        .await?;
                Ok(Self::Docker(controller))
            }
            ServiceConnection::Kubernetes(kubernetes) => {
                let client = kube_client(kubernetes).await?;
                Ok(Self::Kubernetes(KubernetesController::new(
                    client, outpost, &platform, &profile, observer,
                )))
            }
        }
    }

    pub async fn up(&self) -> Result<(), ControllerError> {
        match self {
            Self::Noop => Ok(()),
            Self::Docker(c) => c.up().await,
            Self::Kubernetes(c) => c.up().await,
        }
    }

    pub async fn down(&self) -> Result<(), ControllerError> {
        match self {
            Self::Noop => Ok(()),
            Self::Docker(c) => c.down().await,
            Self::Kubernetes(c) => c.down().await,
        }
    }

    pub async fn up_with_logs(&self) -> Result<Vec<String>, ControllerError> {
        match self {
            Self::Noop => Ok(vec![]),
            Self::Docker(c) => c.up_with_logs().await,
            Self::Kubernetes(c) => c.up_with_logs().await,
        }
    }

    pub async fn down_with_logs(&self) -> Result<Vec<String>, ControllerError> {
        match self {
            Self::Noop => Ok(vec![]),
            Self::Docker(c) => c.down_with_logs().await,
            Self::Kubernetes(c) => c.down_with_logs().await,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        match self {
            Self::Noop => ConnectionState::unhealthy(),
            Self::Docker(c) => c.state().await,
            Self::Kubernetes(c) => c.state().await,
        }
    }

    /// The document `up` converges toward, or an empty document when
    /// nothing is deployed.
    pub fn static_deployment(&self) -> Result<String, serde_yaml::Error> {
        match self {
            Self::Noop => Ok(String::new()),
            Self::Docker(c) => c.static_deployment(),
            Self::Kubernetes(c) => c.static_deployment(),
        }
    }
}

/// Builds a client from the service account, or from a kubeconfig given
/// either as a mapping or as YAML text.
async fn kube_client(connection: &KubernetesConnection) -> Result<Client, ControllerError> {
    let mut config = if connection.local {
        kube::Config::incluster().map_err(ControllerError::invalid_connection)?
    } else {
        let kubeconfig = match &connection.kubeconfig {
            Some(serde_json::Value::String(yaml)) => {
                Kubeconfig::from_yaml(yaml).map_err(ControllerError::invalid_connection)?
            }
            Some(value) => serde_json::from_value::<Kubeconfig>(value.clone())
                .map_err(ControllerError::invalid_connection)?,
            None => {
                return Err(ControllerError::invalid_connection(
                    "kubeconfig is required unless the connection is local",
                ))
            }
        };
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(ControllerError::invalid_connection)?
    };

    if !connection.verify_ssl {
        config.accept_invalid_certs = true;
    }
    Client::try_from(config).map_err(ControllerError::invalid_connection)
}
