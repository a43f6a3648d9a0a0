#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
mod daemon;
mod engine;
mod transport;


pub use self::{
    controller::{static_deployment, DockerController, HEALTH_GRACE_PERIOD, MAX_ATTEMPTS},
    daemon::DockerEngine,
    engine::{Container, ContainerSpec, Engine},
};
