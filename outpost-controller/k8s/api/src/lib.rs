#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cluster;
pub mod monitoring;
pub mod traefik;

pub use self::cluster::{Cluster, Object, FIELD_MANAGER};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{Secret, Service, ServicePort, ServiceSpec},
        networking::v1::{Ingress, IngressSpec},
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
    ByteString,
};
pub use kube::{
    api::{ObjectMeta, ResourceExt},
    core::ErrorResponse,
    Client, Error, Resource,
};

/// Gateway API route kinds.
pub mod gateway {
    pub use gateway_api::apis::experimental::{httproutes::*, tcproutes::*, udproutes::*};

    pub const GROUP: &str = "gateway.networking.k8s.io";
}
