#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
mod connection;
mod error;
pub mod logs;
pub mod naming;
mod observe;
mod outpost;
mod platform;
mod port;
pub mod profile;

pub use self::{
    config::{OutpostConfig, ParentRef},
    connection::{
        CertificateKeyPair, ConnectionState, DockerConnection, KubernetesConnection,
        ServiceConnection,
    },
    error::{BoxError, ControllerError},
    observe::{NoopObserver, Observe, Outcome},
    outpost::{Outpost, OutpostType, Provider, ProviderProtocol, ProxyMode, ProxyProvider},
    platform::{Platform, DEFAULT_IMAGE_BASE},
    port::{DeploymentPort, Protocol},
    profile::{Component, Profile},
};

/// Value of the `app.kubernetes.io/managed-by` label on every managed object.
pub const MANAGED_BY: &str = "goauthentik.io";

/// Path prefix the proxy outpost serves its own endpoints under.
pub const OUTPOST_PATH_PREFIX: &str = "/outpost.goauthentik.io";
