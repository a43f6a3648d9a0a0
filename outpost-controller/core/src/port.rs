use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A network port an outpost listens on.
///
/// `port` is the port exposed to clients. When the process inside the
/// container binds elsewhere (so it can run unprivileged), `inner_port` names
/// that port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DeploymentPort {
    pub port: u16,
    pub name: &'static str,
    pub protocol: Protocol,
    pub inner_port: Option<u16>,
}

// === impl Protocol ===

impl Protocol {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    /// The upper-cased form used by the Kubernetes API.
    pub const fn as_k8s_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl DeploymentPort ===

impl DeploymentPort {
    pub const fn new(port: u16, name: &'static str, protocol: Protocol) -> Self {
        Self {
            port,
            name,
            protocol,
            inner_port: None,
        }
    }

    pub const fn with_inner(
        port: u16,
        name: &'static str,
        protocol: Protocol,
        inner_port: u16,
    ) -> Self {
        Self {
            port,
            name,
            protocol,
            inner_port: Some(inner_port),
        }
    }

    /// The port the outpost process binds inside its container.
    pub fn container_port(&self) -> u16 {
        self.inner_port.unwrap_or(self.port)
    }

    /// Docker's `<port>/<protocol>` key for the container side of a binding.
    pub fn docker_key(&self) -> String {
        format!("{}/{}", self.container_port(), self.protocol)
    }
}
