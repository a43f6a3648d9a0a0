use crate::{
    core::{
        ConnectionState, Observe, Outpost, Platform, Profile, ServiceConnection,
        DEFAULT_IMAGE_BASE,
    },
    docker, k8s, Controller, Metrics,
};
use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prometheus_client::registry::Registry;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "outpost-controller",
    about = "Deploys authentik outposts onto Docker and Kubernetes"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "outpost_controller=info,warn",
        env = "OUTPOST_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    /// Platform release whose outpost image is deployed.
    #[clap(
        long,
        default_value = env!("CARGO_PKG_VERSION"),
        env = "OUTPOST_CONTROLLER_PLATFORM_VERSION"
    )]
    platform_version: String,

    #[clap(long, default_value = "", env = "OUTPOST_CONTROLLER_BUILD_HASH")]
    build_hash: String,

    /// Image template with `%(type)s`, `%(version)s` and `%(build_hash)s`
    /// keys.
    #[clap(
        long,
        default_value = DEFAULT_IMAGE_BASE,
        env = "OUTPOST_CONTROLLER_IMAGE_BASE"
    )]
    image_base: String,

    /// Writes an OpenMetrics snapshot to this file on exit.
    #[clap(long)]
    metrics_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Converges the runtime toward the outpost's desired state.
    Up(Target),

    /// Removes everything deployed for the outpost.
    Down(Target),

    /// Prints the deployment without contacting the runtime.
    Static {
        #[clap(long)]
        outpost: PathBuf,

        /// Runtime to render for; defaults to the service connection's.
        #[clap(long)]
        runtime: Option<Runtime>,
    },

    /// Checks that the outpost's service connection is reachable.
    State {
        #[clap(long)]
        outpost: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
struct Target {
    /// YAML or JSON outpost document.
    #[clap(long)]
    outpost: PathBuf,

    /// Prints the messages logged by each step.
    #[clap(long)]
    with_logs: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Runtime {
    Docker,
    Kubernetes,
}

/// An outpost and the connection to the runtime it is deployed onto.
#[derive(Clone, Debug, Deserialize)]
pub struct Document {
    pub outpost: Outpost,
    #[serde(default)]
    pub service_connection: Option<ServiceConnection>,
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            platform_version,
            build_hash,
            image_base,
            metrics_file,
            command,
        } = self;

        log_format.try_init(log_level)?;

        let platform = Platform {
            version: platform_version,
            build_hash,
            image_base,
        };

        let mut prom = <Registry>::default();
        let metrics = Arc::new(Metrics::register(
            prom.sub_registry_with_prefix("outpost_controller"),
        ));

        let result = command.run(platform, metrics).await;

        if let Some(path) = metrics_file {
            let mut text = String::new();
            prometheus_client::encoding::text::encode(&mut text, &prom)?;
            tokio::fs::write(&path, text)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        result
    }
}

// === impl Command ===

impl Command {
    async fn run(self, platform: Platform, metrics: Arc<Metrics>) -> Result<()> {
        match self {
            Self::Up(Target { outpost, with_logs }) => {
                let (document, span) = Document::load(&outpost).await?;
                let controller = document
                    .connect(platform, metrics)
                    .instrument(span.clone())
                    .await?;
                async {
                    if with_logs {
                        print_lines(controller.up_with_logs().await?);
                    } else {
                        controller.up().await?;
                    }
                    info!("Deployed");
                    Ok(())
                }
                .instrument(span)
                .await
            }

            Self::Down(Target { outpost, with_logs }) => {
                let (document, span) = Document::load(&outpost).await?;
                let controller = document
                    .connect(platform, metrics)
                    .instrument(span.clone())
                    .await?;
                async {
                    if with_logs {
                        print_lines(controller.down_with_logs().await?);
                    } else {
                        controller.down().await?;
                    }
                    info!("Removed");
                    Ok(())
                }
                .instrument(span)
                .await
            }

            Self::Static { outpost, runtime } => {
                let (document, _) = Document::load(&outpost).await?;
                println!("{}", document.render(&platform, runtime)?);
                Ok(())
            }

            Self::State { outpost } => {
                let (document, span) = Document::load(&outpost).await?;
                let Some(connection) = document.service_connection.clone() else {
                    bail!("outpost {:?} has no service connection", document.outpost.name);
                };
                let connected = document
                    .connect(platform, metrics.clone())
                    .instrument(span)
                    .await;
                let state = match connected {
                    Ok(controller) => controller.state().await,
                    Err(error) => {
                        info!(%error, "Failed to connect");
                        ConnectionState::unhealthy()
                    }
                };
                metrics.connection_state(connection.name(), &state);
                println!("{}", serde_json::to_string(&state)?);
                Ok(())
            }
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

// === impl Document ===

impl Document {
    async fn load(path: &std::path::Path) -> Result<(Self, tracing::Span)> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let document = Self::parse(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let span = info_span!("outpost", name = %document.outpost.name);
        Ok((document, span))
    }

    /// Parses a YAML or JSON document.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    async fn connect(self, platform: Platform, metrics: Arc<Metrics>) -> Result<Controller> {
        let controller = Controller::connect(
            Arc::new(self.outpost),
            self.service_connection.as_ref(),
            platform,
            metrics,
        )
        .await?;
        Ok(controller)
    }

    fn render(&self, platform: &Platform, runtime: Option<Runtime>) -> Result<String> {
        let runtime = match (runtime, &self.service_connection) {
            (Some(runtime), _) => runtime,
            (None, Some(ServiceConnection::Docker(_))) => Runtime::Docker,
            (None, Some(ServiceConnection::Kubernetes(_))) => Runtime::Kubernetes,
            (None, None) => bail!("--runtime is required without a service connection"),
        };
        let profile = Profile::for_type(self.outpost.kind);
        let rendered = match runtime {
            Runtime::Docker => docker::static_deployment(&self.outpost, platform, &profile)?,
            Runtime::Kubernetes => {
                k8s::static_manifests(Arc::new(self.outpost.clone()), platform, &profile)?
            }
        };
        Ok(rendered)
    }
}
