use serde::{Deserialize, Serialize};

/// Credentials and endpoint of the runtime an outpost is deployed onto.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServiceConnection {
    Docker(DockerConnection),
    Kubernetes(KubernetesConnection),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DockerConnection {
    pub name: String,

    /// Connect through the local daemon socket.
    #[serde(default)]
    pub local: bool,

    /// Daemon URL: `unix://`, `tcp://`, `http://`, `https://` or `ssh://`.
    #[serde(default)]
    pub url: String,

    /// CA certificate used to verify the daemon.
    #[serde(default)]
    pub tls_verification: Option<CertificateKeyPair>,

    /// Client certificate and key; over SSH only the key is used.
    #[serde(default)]
    pub tls_authentication: Option<CertificateKeyPair>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct KubernetesConnection {
    pub name: String,

    /// Use the in-cluster service account.
    #[serde(default)]
    pub local: bool,

    #[serde(default)]
    pub kubeconfig: Option<serde_json::Value>,

    #[serde(default = "verify_ssl_default")]
    pub verify_ssl: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CertificateKeyPair {
    pub name: String,
    pub certificate_data: String,
    #[serde(default)]
    pub key_data: Option<String>,
}

/// Result of probing a service connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub version: String,
    pub healthy: bool,
}

fn verify_ssl_default() -> bool {
    true
}

// === impl ServiceConnection ===

impl ServiceConnection {
    pub fn name(&self) -> &str {
        match self {
            Self::Docker(c) => &c.name,
            Self::Kubernetes(c) => &c.name,
        }
    }
}

// === impl ConnectionState ===

impl ConnectionState {
    pub fn healthy(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            healthy: true,
        }
    }

    pub fn unhealthy() -> Self {
        Self::default()
    }
}
