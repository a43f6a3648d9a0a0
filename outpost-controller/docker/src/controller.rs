use crate::{
    daemon::DockerEngine,
    engine::{normalize_reference, Container, ContainerSpec, Engine},
};
use outpost_controller_core::{
    logs, naming, ConnectionState, ControllerError, DeploymentPort, DockerConnection, Observe,
    Outcome, Outpost, OutpostType, Platform, Profile, OUTPOST_PATH_PREFIX,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Attempts made to converge the container before giving up.
pub const MAX_ATTEMPTS: usize = 10;

/// Time a freshly created container gets before its health is judged.
pub const HEALTH_GRACE_PERIOD: Duration = Duration::from_secs(60);

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(2);

const RESTART_POLICY: &str = "unless-stopped";
const COMPONENT: &str = "container";

/// Converges the single container an outpost runs as on a Docker daemon.
pub struct DockerController<E> {
    engine: E,
    outpost: Arc<Outpost>,
    platform: Platform,
    ports: Vec<DeploymentPort>,
    name: String,
    observer: Arc<dyn Observe>,
    grace: Duration,
}

enum Attempt {
    Converged(Outcome),
    Drifted(&'static str),
}

// === impl DockerController ===

impl DockerController<DockerEngine> {
    /// Connects to the daemon described by `connection`.
    pub async fn connect(
        connection: &DockerConnection,
        outpost: Arc<Outpost>,
        platform: Platform,
        profile: &Profile,
        observer: Arc<dyn Observe>,
    ) -> Result<Self, ControllerError> {
        let engine = DockerEngine::connect(connection).await?;
        Ok(Self::new(engine, outpost, platform, profile, observer))
    }
}

impl<E: Engine> DockerController<E> {
    pub fn new(
        engine: E,
        outpost: Arc<Outpost>,
        platform: Platform,
        profile: &Profile,
        observer: Arc<dyn Observe>,
    ) -> Self {
        let name = naming::object_name(
            &outpost.config.object_naming_template,
            &outpost.name,
            &outpost.uuid_hex(),
        );
        Self {
            engine,
            ports: profile.docker_ports(),
            name,
            outpost,
            platform,
            observer,
            grace: HEALTH_GRACE_PERIOD,
        }
    }

    pub fn with_health_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> &[DeploymentPort] {
        &self.ports
    }

    pub async fn up(&self) -> Result<(), ControllerError> {
        if self.outpost.embedded {
            debug!(outpost = %self.outpost.name, "Embedded outposts are managed by the platform");
            return Ok(());
        }
        let result = self
            .converge()
            .instrument(info_span!("reconcile", container = %self.name))
            .await;
        self.observe(result)
    }

    /// Stops and removes the container. An absent container is not an error.
    pub async fn down(&self) -> Result<(), ControllerError> {
        if self.outpost.embedded {
            return Ok(());
        }
        let result = self
            .remove()
            .instrument(info_span!("reconcile", container = %self.name))
            .await;
        self.observe(result)
    }

    pub async fn up_with_logs(&self) -> Result<Vec<String>, ControllerError> {
        let (result, lines) = logs::capture(self.up()).await;
        result.map(|()| lines)
    }

    pub async fn down_with_logs(&self) -> Result<Vec<String>, ControllerError> {
        let (result, lines) = logs::capture(self.down()).await;
        result.map(|()| lines)
    }

    pub async fn state(&self) -> ConnectionState {
        match self.engine.version().await {
            Ok(version) => ConnectionState::healthy(version),
            Err(error) => {
                info!(%error, "Failed to get Docker version");
                ConnectionState::unhealthy()
            }
        }
    }

    /// The compose document `up` would converge toward.
    pub fn static_deployment(&self) -> Result<String, serde_yaml::Error> {
        let image = self.platform.container_image(&self.outpost);
        compose(&self.outpost, &self.ports, image, self.labels())
    }

    fn observe(&self, result: Result<Outcome, ControllerError>) -> Result<(), ControllerError> {
        match result {
            Ok(outcome) => {
                self.observer.reconciled(&self.outpost, COMPONENT, outcome);
                Ok(())
            }
            Err(error) => {
                self.observer.failed(&self.outpost, COMPONENT);
                Err(error)
            }
        }
    }

    async fn converge(&self) -> Result<Outcome, ControllerError> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt().await? {
                Attempt::Converged(outcome) => return Ok(outcome),
                Attempt::Drifted(reason) => {
                    info!(%reason, attempt, "Recreating");
                    self.engine
                        .remove(&self.name)
                        .await
                        .map_err(ControllerError::docker)?;
                }
            }
        }
        warn!(attempts = MAX_ATTEMPTS, "Container did not converge");
        Err(ControllerError::GaveUp {
            attempts: MAX_ATTEMPTS,
        })
    }

    async fn attempt(&self) -> Result<Attempt, ControllerError> {
        let Some(container) = self.inspect().await? else {
            self.create().await?;
            return Ok(Attempt::Converged(Outcome::Created));
        };

        if !self.image_matches(&container).await {
            return Ok(Attempt::Drifted("image"));
        }
        if self.ports_differ(&container) {
            return Ok(Attempt::Drifted("ports"));
        }
        if env_differs(&container, &self.env()) {
            return Ok(Attempt::Drifted("environment"));
        }
        if labels_differ(&container, &self.labels()) {
            return Ok(Attempt::Drifted("labels"));
        }
        if container.restart_policy.as_deref() != Some(RESTART_POLICY) {
            return Ok(Attempt::Drifted("restart policy"));
        }

        if container.running && !container.is_healthy() {
            info!("Restarting unhealthy container");
            self.engine
                .restart(&self.name)
                .await
                .map_err(ControllerError::docker)?;
            return Ok(Attempt::Converged(Outcome::Restarted));
        }
        if !container.running {
            info!("Starting");
            self.engine
                .start(&self.name)
                .await
                .map_err(ControllerError::docker)?;
            return Ok(Attempt::Converged(Outcome::Started));
        }
        Ok(Attempt::Converged(Outcome::Unchanged))
    }

    async fn inspect(&self) -> Result<Option<Container>, ControllerError> {
        self.engine
            .inspect(&self.name)
            .await
            .map_err(ControllerError::docker)
    }

    async fn create(&self) -> Result<(), ControllerError> {
        let image = self.pull_image().await;
        info!(%image, "Creating");
        let spec = ContainerSpec {
            name: self.name.clone(),
            image,
            env: self.env(),
            labels: self.labels(),
            ports: self.port_bindings(),
            network: self.outpost.config.docker_network.clone(),
            restart_policy: RESTART_POLICY,
        };
        self.engine
            .create(&spec)
            .await
            .map_err(ControllerError::docker)?;
        self.engine
            .start(&self.name)
            .await
            .map_err(ControllerError::docker)?;
        self.settle().await
    }

    /// Waits up to the grace period for a new container's health check to
    /// settle, restarting it once if it is still unhealthy.
    async fn settle(&self) -> Result<(), ControllerError> {
        let deadline = Instant::now() + self.grace;
        loop {
            let Some(container) = self.inspect().await? else {
                return Ok(());
            };
            if !container.running || container.is_settled() {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                if !container.is_healthy() {
                    info!("Restarting unhealthy container");
                    self.engine
                        .restart(&self.name)
                        .await
                        .map_err(ControllerError::docker)?;
                }
                return Ok(());
            }
            debug!(health = ?container.health, "Waiting for container to become healthy");
            sleep(HEALTH_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn remove(&self) -> Result<Outcome, ControllerError> {
        let Some(container) = self.inspect().await? else {
            debug!("Container does not exist");
            return Ok(Outcome::Absent);
        };
        if container.running {
            info!("Stopping");
            self.engine
                .kill(&self.name)
                .await
                .map_err(ControllerError::docker)?;
        }
        info!("Removing");
        self.engine
            .remove(&self.name)
            .await
            .map_err(ControllerError::docker)?;
        Ok(Outcome::Deleted)
    }

    /// Pulls the desired image, or the published fallback if that fails.
    async fn pull_image(&self) -> String {
        let image = self.platform.container_image(&self.outpost);
        match self.engine.pull(&image).await {
            Ok(()) => image,
            Err(error) => {
                let fallback = Platform::fallback_image(self.outpost.kind);
                warn!(%image, %fallback, %error, "Failed to pull image, using fallback");
                if let Err(error) = self.engine.pull(&fallback).await {
                    warn!(%fallback, %error, "Failed to pull fallback image");
                }
                fallback
            }
        }
    }

    /// A container running the fallback image is only current while the
    /// desired image remains unavailable.
    async fn image_matches(&self, container: &Container) -> bool {
        let tagged = |image: &str| {
            let image = normalize_reference(image);
            container
                .image_tags
                .iter()
                .any(|tag| normalize_reference(tag) == image)
        };

        let image = self.platform.container_image(&self.outpost);
        if container.image_tags.is_empty() || tagged(&image) {
            return true;
        }
        if tagged(&Platform::fallback_image(self.outpost.kind)) {
            return self.engine.pull(&image).await.is_err();
        }
        false
    }

    /// Whether a published port is not bound to its host port. Containers
    /// on the host network publish nothing.
    pub(crate) fn ports_differ(&self, container: &Container) -> bool {
        let host_network = container.network_mode.as_deref() == Some("host");
        if !self.outpost.config.docker_map_ports || host_network {
            return false;
        }
        self.ports.iter().any(|port| {
            let Some(host_ports) = container.port_bindings.get(&port.docker_key()) else {
                return true;
            };
            !host_ports
                .iter()
                .any(|host| host.parse::<u16>().ok() == Some(port.port))
        })
    }

    fn port_bindings(&self) -> BTreeMap<String, u16> {
        if !self.outpost.config.docker_map_ports {
            return BTreeMap::new();
        }
        self.ports
            .iter()
            .map(|port| (port.docker_key(), port.port))
            .collect()
    }

    pub(crate) fn env(&self) -> BTreeMap<String, String> {
        environment(&self.outpost)
    }

    pub(crate) fn labels(&self) -> BTreeMap<String, String> {
        labels(&self.outpost, &self.name)
    }
}

fn environment(outpost: &Outpost) -> BTreeMap<String, String> {
    let config = &outpost.config;
    BTreeMap::from([
        (
            "AUTHENTIK_HOST".to_string(),
            config.authentik_host.to_lowercase(),
        ),
        (
            "AUTHENTIK_INSECURE".to_string(),
            config.authentik_host_insecure.to_string(),
        ),
        ("AUTHENTIK_TOKEN".to_string(), outpost.token.clone()),
        (
            "AUTHENTIK_HOST_BROWSER".to_string(),
            config.authentik_host_browser.clone(),
        ),
    ])
}

fn labels(outpost: &Outpost, name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([(
        "io.goauthentik.outpost-uuid".to_string(),
        outpost.uuid_hex(),
    )]);
    if outpost.kind == OutpostType::Proxy {
        labels.extend(traefik_labels(outpost, name));
    }
    labels.extend(outpost.config.docker_labels.clone());
    labels
}

/// Routes a co-located Traefik's requests for the outpost path on every
/// provider host to the proxy container.
fn traefik_labels(outpost: &Outpost, name: &str) -> BTreeMap<String, String> {
    let hosts = outpost
        .proxy_providers()
        .filter_map(|p| p.host())
        .map(|host| format!("Host(`{host}`)"))
        .collect::<Vec<_>>();
    let router = format!("traefik.http.routers.{name}-router");
    let service = format!("traefik.http.services.{name}-service.loadbalancer");

    let mut labels = BTreeMap::new();
    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert(
        format!("{router}.rule"),
        format!(
            "({}) && PathPrefix(`{OUTPOST_PATH_PREFIX}`)",
            hosts.join(" || ")
        ),
    );
    labels.insert(format!("{router}.tls"), "true".to_string());
    labels.insert(format!("{router}.service"), format!("{name}-service"));
    labels.insert(
        format!("{service}.healthcheck.path"),
        format!("{OUTPOST_PATH_PREFIX}/ping"),
    );
    labels.insert(format!("{service}.healthcheck.port"), "9300".to_string());
    labels.insert(format!("{service}.server.port"), "9000".to_string());
    labels
}

/// Whether any desired variable is missing from the container or set to
/// another value. Variables the container adds are ignored.
pub(crate) fn env_differs(container: &Container, env: &BTreeMap<String, String>) -> bool {
    env.iter()
        .any(|(key, value)| container.env_value(key) != Some(value.as_str()))
}

/// Whether any desired label is missing or different. Labels added by
/// users are ignored.
pub(crate) fn labels_differ(container: &Container, labels: &BTreeMap<String, String>) -> bool {
    labels
        .iter()
        .any(|(key, value)| container.labels.get(key) != Some(value))
}

#[derive(Serialize)]
struct Compose {
    services: BTreeMap<String, ComposeService>,
}

#[derive(Serialize)]
struct ComposeService {
    image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    environment: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
}

/// Renders a compose document running the outpost, without contacting a
/// daemon.
pub fn static_deployment(
    outpost: &Outpost,
    platform: &Platform,
    profile: &Profile,
) -> Result<String, serde_yaml::Error> {
    let name = naming::object_name(
        &outpost.config.object_naming_template,
        &outpost.name,
        &outpost.uuid_hex(),
    );
    compose(
        outpost,
        &profile.docker_ports(),
        platform.container_image(outpost),
        labels(outpost, &name),
    )
}

fn compose(
    outpost: &Outpost,
    ports: &[DeploymentPort],
    image: String,
    labels: BTreeMap<String, String>,
) -> Result<String, serde_yaml::Error> {
    let service = ComposeService {
        image,
        ports: ports
            .iter()
            .map(|p| format!("{}:{}/{}", p.port, p.container_port(), p.protocol))
            .collect(),
        environment: environment(outpost),
        labels,
    };
    let document = Compose {
        services: BTreeMap::from([(format!("authentik_{}", outpost.kind), service)]),
    };
    serde_yaml::to_string(&document)
}
