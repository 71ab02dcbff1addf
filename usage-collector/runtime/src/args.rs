use crate::{
    config::{self, Config, Format},
    core::Obfuscator,
    k8s::KubeCluster,
    Collector,
};
use anyhow::{anyhow, bail, Result};
use clap::{ArgAction, Parser};
use kube::config::Kubeconfig;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Gather Kubernetes cluster information for ambient migration cost estimation.
///
/// Collects the resources requested and used by application containers and Istio sidecars in
/// each namespace, along with node capacity and placement, to estimate what migrating from a
/// sidecar mesh to an ambient mesh would save.
#[derive(Debug, Parser)]
#[clap(name = "istio-usage-collector", version, about)]
pub struct Args {
    #[clap(
        long,
        default_value = "istio_usage_collector=info,warn",
        env = "ISTIO_USAGE_COLLECTOR_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Hide the names of the cluster, namespaces, and nodes by hashing them.
    #[clap(
        long,
        short = 'n',
        default_value = "true",
        default_missing_value = "true",
        num_args = 0..=1,
        action = ArgAction::Set
    )]
    hide_names: bool,

    /// Continue from the output file left by an interrupted run.
    #[clap(long = "continue", short = 'c')]
    resume: bool,

    /// Directory to store the output file in.
    #[clap(long, short = 'd', default_value = ".")]
    output_dir: PathBuf,

    /// Output file format.
    #[clap(long, short = 'f', value_enum, default_value = "json")]
    format: Format,

    /// Output file name prefix. Defaults to the (possibly hashed) context name.
    #[clap(long, short = 'p')]
    output_prefix: Option<String>,

    /// Disable progress bars.
    #[clap(long)]
    no_progress: bool,

    /// Maximum number of processors to size concurrency by. Values <= 0 use all of them.
    #[clap(long, default_value = "0", allow_negative_numbers = true)]
    max_processors: i32,

    /// Abort collection after this long.
    #[clap(long, default_value = "30m", value_parser = config::parse_duration)]
    timeout: Duration,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            hide_names,
            resume,
            output_dir,
            format,
            output_prefix,
            no_progress,
            max_processors,
            timeout,
        } = self;

        if let Err(error) = log_format.try_init(log_level) {
            bail!("failed to configure logging: {error}");
        }

        let context = context_name(&client)?;
        info!(%context, "Using Kubernetes context");

        let obfuscator = Arc::new(Obfuscator::new());
        let prefix = match output_prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => prefix,
            None if hide_names => obfuscator.obfuscate(&context),
            None => context.clone(),
        };

        let config = Config {
            context,
            hide_names,
            resume,
            output: config::output_path(output_dir, &prefix, format),
            parallelism: config::parallelism(max_processors),
            progress: !no_progress,
            timeout,
        };

        let client = client.try_client().await?;
        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));

        let output = config.output.clone();
        let report = Collector::new(KubeCluster::new(client), config, obfuscator)
            .run(shutdown)
            .await?;

        info!(
            namespaces = report.namespaces.len(),
            nodes = report.nodes.len(),
            path = %output.display(),
            "Cluster information gathered successfully"
        );
        Ok(())
    }
}

/// The context named on the command line, else the kubeconfig's current context.
fn context_name(client: &kubert::ClientArgs) -> Result<String> {
    if let Some(context) = client.context.clone().filter(|c| !c.is_empty()) {
        return Ok(context);
    }

    let kubeconfig = match &client.kubeconfig {
        Some(path) => Kubeconfig::read_from(path)?,
        None => Kubeconfig::read()?,
    };
    kubeconfig
        .current_context
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("no current Kubernetes context is set; use --context"))
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(%error, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        res = signal::ctrl_c() => {
            if let Err(error) = res {
                warn!(%error, "Failed to register SIGINT handler");
                return;
            }
            info!("Received SIGINT, shutting down");
        }
        _ = terminate => info!("Received SIGTERM, shutting down"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}
