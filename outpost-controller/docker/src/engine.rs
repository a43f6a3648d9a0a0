use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A container as reported by the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container {
    /// Tags of the image the container was created from.
    pub image_tags: Vec<String>,
    /// `KEY=value` entries.
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    /// Host ports bound to each `<port>/<protocol>` of the container.
    pub port_bindings: BTreeMap<String, Vec<String>>,
    pub restart_policy: Option<String>,
    pub network_mode: Option<String>,
    pub running: bool,
    /// Health check status, if the image defines a health check.
    pub health: Option<String>,
}

/// The container to create for an outpost.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Host port for each `<port>/<protocol>` of the container.
    pub ports: BTreeMap<String, u16>,
    pub network: Option<String>,
    pub restart_policy: &'static str,
}

/// The Docker Engine operations the controller depends on.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Returns `None` if no container has this name.
    async fn inspect(&self, name: &str) -> Result<Option<Container>>;

    async fn pull(&self, image: &str) -> Result<()>;

    async fn create(&self, spec: &ContainerSpec) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn restart(&self, name: &str) -> Result<()>;

    async fn kill(&self, name: &str) -> Result<()>;

    /// Force-removes a container; an absent container is not an error.
    async fn remove(&self, name: &str) -> Result<()>;

    async fn version(&self) -> Result<String>;
}

// === impl Container ===

impl Container {
    /// A container is healthy unless its health check says otherwise.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self.health.as_deref(),
            None | Some("") | Some("none") | Some("healthy") | Some("starting")
        )
    }

    /// Whether the health check has reached a verdict, or there is none.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.health.as_deref(),
            None | Some("") | Some("none") | Some("healthy")
        )
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

/// The form the daemon reports an image reference in: the default registry
/// and `library/` namespace are dropped and a missing tag means `latest`.
pub(crate) fn normalize_reference(reference: &str) -> String {
    let reference = reference.trim();
    let reference = ["docker.io/", "index.docker.io/", "registry-1.docker.io/"]
        .iter()
        .find_map(|registry| reference.strip_prefix(registry))
        .map(|path| path.strip_prefix("library/").unwrap_or(path))
        .unwrap_or(reference);

    let name = reference.rsplit('/').next().unwrap_or(reference);
    if reference.contains('@') || name.contains(':') {
        reference.to_string()
    } else {
        format!("{reference}:latest")
    }
}
