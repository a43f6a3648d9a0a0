#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
mod database;
mod deployment;
mod ingress;
mod meta;
mod middleware;
mod reconciler;
mod route;
mod secret;
mod service;
mod service_monitor;

#[cfg(test)]
mod tests;

pub use self::{
    controller::{static_manifests, KubernetesController},
    database::CredentialFiles,
    reconciler::{Context, Trigger},
};
