#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use outpost_controller_core as core;
pub use outpost_controller_docker as docker;
pub use outpost_controller_k8s as k8s;
pub use outpost_controller_k8s_api as k8s_api;

mod args;
mod controller;
mod metrics;

pub use self::{
    args::{Args, Document},
    controller::Controller,
    metrics::Metrics,
};
