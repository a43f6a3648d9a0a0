//! Ways of reaching a Docker daemon, and the credential files they need.
//!
//! Credentials are written to a private temporary directory that is removed
//! when the owning value is dropped.

use anyhow::{anyhow, bail, Context as _, Result};
use outpost_controller_core::CertificateKeyPair;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};
use tempfile::TempDir;
use tokio::{
    process::{Child, Command},
    time::{sleep, Duration, Instant},
};
use tracing::{debug, info};

/// Marks an SSH configuration written by this controller.
const SSH_CONFIG_HEADER: &str = "# Managed by authentik";

const TUNNEL_TIMEOUT: Duration = Duration::from_secs(30);
const TUNNEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DaemonUrl {
    Unix(String),
    Tcp { host: String, port: u16 },
    Ssh(SshTarget),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SshTarget {
    pub(crate) user: Option<String>,
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
}

/// Client certificate material for a TLS connection.
pub(crate) struct InlineTls {
    dir: TempDir,
}

/// An `ssh` process forwarding the remote daemon's socket to a local one.
pub(crate) struct SshTunnel {
    // Dropped first, killing the process before its socket is removed.
    _child: Child,
    socket: PathBuf,
    _dir: TempDir,
}

// === impl DaemonUrl ===

impl DaemonUrl {
    pub(crate) fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| anyhow!("no scheme in daemon URL {url:?}"))?;
        let authority = rest.split('/').next().unwrap_or_default();

        match scheme.to_ascii_lowercase().as_str() {
            "unix" => {
                if rest.is_empty() {
                    bail!("no socket path in daemon URL {url:?}");
                }
                Ok(Self::Unix(rest.to_string()))
            }
            scheme @ ("tcp" | "http" | "https") => {
                let (host, port) = split_port(authority)?;
                let default_port = if scheme == "https" { 2376 } else { 2375 };
                Ok(Self::Tcp {
                    host,
                    port: port.unwrap_or(default_port),
                })
            }
            "ssh" => {
                let (user, host) = match authority.rsplit_once('@') {
                    Some((user, host)) => (Some(user.to_string()), host),
                    None => (None, authority),
                };
                let (host, port) = split_port(host)?;
                Ok(Self::Ssh(SshTarget { user, host, port }))
            }
            other => bail!("unsupported daemon URL scheme {other:?}"),
        }
    }
}

fn split_port(authority: &str) -> Result<(String, Option<u16>)> {
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port.parse::<u16>().context("invalid port")?)),
        None => (authority, None),
    };
    if host.is_empty() {
        bail!("no host in daemon URL");
    }
    Ok((host.to_string(), port))
}

// === impl SshTarget ===

impl SshTarget {
    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

// === impl InlineTls ===

impl InlineTls {
    const CA: &'static str = "ca.pem";
    const CERT: &'static str = "cert.pem";
    const KEY: &'static str = "key.pem";

    pub(crate) fn write(
        verification: &CertificateKeyPair,
        authentication: &CertificateKeyPair,
    ) -> Result<Self> {
        let key = authentication
            .key_data
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("certificate {:?} has no private key", authentication.name))?;

        let dir = tempfile::Builder::new()
            .prefix("outpost-docker-tls-")
            .tempdir()?;
        write_private(&dir.path().join(Self::CA), &verification.certificate_data)?;
        write_private(&dir.path().join(Self::CERT), &authentication.certificate_data)?;
        write_private(&dir.path().join(Self::KEY), key)?;
        Ok(Self { dir })
    }

    pub(crate) fn ca(&self) -> PathBuf {
        self.dir.path().join(Self::CA)
    }

    pub(crate) fn cert(&self) -> PathBuf {
        self.dir.path().join(Self::CERT)
    }

    pub(crate) fn key(&self) -> PathBuf {
        self.dir.path().join(Self::KEY)
    }
}

// === impl SshTunnel ===

impl SshTunnel {
    pub(crate) async fn open(
        target: &SshTarget,
        keypair: Option<&CertificateKeyPair>,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("outpost-docker-ssh-")
            .tempdir()?;
        let socket = dir.path().join("docker.sock");

        let mut command = Command::new("ssh");
        let user_config = user_ssh_config().await;
        match inline_identity(keypair, user_config.as_deref()) {
            None => debug!("SSH configuration is managed externally"),
            Some(key) => {
                let identity = dir.path().join("identity");
                write_private(&identity, key)?;
                let config = dir.path().join("config");
                write_private(&config, &ssh_config(&target.host, &identity))?;
                command.arg("-F").arg(&config);
            }
        }

        command
            .args(["-nNT", "-o", "ExitOnForwardFailure=yes", "-L"])
            .arg(format!("{}:/var/run/docker.sock", socket.display()));
        if let Some(port) = target.port {
            command.arg("-p").arg(port.to_string());
        }
        command
            .arg(target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);

        info!(host = %target.host, "Opening SSH tunnel");
        let mut child = command.spawn().context("failed to start ssh")?;
        let deadline = Instant::now() + TUNNEL_TIMEOUT;
        while !socket.exists() {
            if let Some(status) = child.try_wait()? {
                bail!("ssh exited before forwarding the daemon socket: {status}");
            }
            if Instant::now() >= deadline {
                bail!("timed out waiting for the SSH tunnel to {}", target.host);
            }
            sleep(TUNNEL_POLL_INTERVAL).await;
        }

        Ok(Self {
            _child: child,
            socket,
            _dir: dir,
        })
    }

    pub(crate) fn socket(&self) -> &Path {
        &self.socket
    }
}

/// The private key to configure for the tunnel.
///
/// `None` when there is no key, or when the user's own SSH configuration
/// was not written by us and so must be left in charge.
fn inline_identity<'k>(
    keypair: Option<&'k CertificateKeyPair>,
    user_config: Option<&str>,
) -> Option<&'k str> {
    let key = keypair?
        .key_data
        .as_deref()
        .filter(|k| !k.trim().is_empty())?;
    match user_config {
        Some(config) if !config.starts_with(SSH_CONFIG_HEADER) => None,
        _ => Some(key),
    }
}

async fn user_ssh_config() -> Option<String> {
    let home = std::env::var_os("HOME")?;
    tokio::fs::read_to_string(Path::new(&home).join(".ssh").join("config"))
        .await
        .ok()
}

fn ssh_config(host: &str, identity: &Path) -> String {
    format!(
        "{SSH_CONFIG_HEADER}\nHost {host}\n    IdentityFile {}\n    IdentitiesOnly yes\n    StrictHostKeyChecking no\n    UserKnownHostsFile /dev/null\n",
        identity.display()
    )
}

/// Writes a file only the current user can read.
fn write_private(path: &Path, contents: &str) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}
