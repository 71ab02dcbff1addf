use crate::{
    config::Config,
    core::{ClusterReport, Obfuscator},
    inject::{Injector, SelectorMatchCache},
    k8s::{self, Cluster, Namespace, ResourceExt},
    namespace, node,
    pass::{Dispatch, Kind, PassError},
    persist,
    retry::Backoff,
    Context,
};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "{} holds a report for cluster {found:?}, not {expected:?}; remove it or collect without --continue",
        .path.display()
    )]
    ClusterMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("failed to connect to the Kubernetes API server: {0}")]
    Connect(#[source] k8s::Error),

    #[error(transparent)]
    Pass(#[from] PassError),

    #[error("failed to save report: {0}")]
    Save(#[source] persist::Error),
}

/// Collects a [`ClusterReport`] from a cluster and writes it to the configured output.
pub struct Collector<C> {
    cluster: Arc<C>,
    config: Config,
    obfuscator: Arc<Obfuscator>,
    selectors: Arc<SelectorMatchCache>,
    backoff: Backoff,
}

// === impl Collector ===

impl<C: Cluster> Collector<C> {
    pub fn new(cluster: C, config: Config, obfuscator: Arc<Obfuscator>) -> Self {
        Self {
            cluster: Arc::new(cluster),
            config,
            obfuscator,
            selectors: Default::default(),
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(self, backoff: Backoff) -> Self {
        Self { backoff, ..self }
    }

    /// The cluster name recorded in the report.
    pub fn report_name(&self) -> String {
        if self.config.hide_names {
            self.obfuscator.obfuscate(&self.config.context)
        } else {
            self.config.context.clone()
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<ClusterReport, Error> {
        let mut report = self.seed(self.report_name())?;

        let namespaces = self
            .cluster
            .list_namespaces()
            .await
            .map_err(Error::Connect)?;

        let metrics = self.cluster.metrics_available().await;
        if metrics {
            info!("Metrics API available");
        } else {
            warn!("Metrics API not available; actual usage will not be reported");
        }

        let injector = match self.cluster.list_mutating_webhooks().await {
            Ok(configs) => {
                let injector = Injector::new(&configs, self.selectors.clone());
                debug!(webhooks = injector.len(), "Loaded injection webhooks");
                Some(injector)
            }
            Err(error) => {
                warn!(%error, "Failed to list mutating webhooks; treating every pod as eligible for injection");
                None
            }
        };

        let ctx = Arc::new(Context {
            cluster: self.cluster.clone(),
            injector,
            metrics,
            backoff: self.backoff,
            shutdown: shutdown.clone(),
        });

        let deadline = tokio::spawn({
            let timeout = self.config.timeout;
            async move {
                time::sleep(timeout).await;
                warn!(?timeout, "Collection deadline exceeded");
                shutdown.cancel();
            }
        });
        let res = self.collect(&ctx, namespaces, &mut report).await;
        deadline.abort();

        report.has_metrics = metrics;
        if let Err(error) = res {
            // Keep what was collected so that a resumed run only retries what is missing.
            if self.config.resume {
                warn!(%error, path = %self.config.output.display(), "Saving partial report");
                if let Err(error) = persist::save(&report, &self.config.output) {
                    warn!(%error, "Failed to save partial report");
                }
            }
            return Err(error.into());
        }

        persist::save(&report, &self.config.output).map_err(Error::Save)?;
        debug!(
            selector_hits = self.selectors.hits(),
            selector_misses = self.selectors.misses(),
            "Collection complete"
        );
        Ok(report)
    }

    /// Loads the existing report when resuming.
    fn seed(&self, name: String) -> Result<ClusterReport, Error> {
        if !self.config.resume {
            return Ok(ClusterReport::new(name));
        }

        let path = &self.config.output;
        info!(path = %path.display(), "Continuing from existing report");
        match persist::load(path) {
            Ok(report) if report.name == name => {
                info!(
                    namespaces = report.namespaces.len(),
                    nodes = report.nodes.len(),
                    "Loaded existing report"
                );
                Ok(report)
            }
            Ok(report) => Err(Error::ClusterMismatch {
                path: path.clone(),
                expected: name,
                found: report.name,
            }),
            Err(error) => {
                warn!(%error, "Failed to load existing report; starting fresh");
                Ok(ClusterReport::new(name))
            }
        }
    }

    async fn collect(
        &self,
        ctx: &Arc<Context<C>>,
        namespaces: Vec<Namespace>,
        report: &mut ClusterReport,
    ) -> Result<(), PassError> {
        let dispatch = |kind: Kind| Dispatch {
            kind,
            resume: self.config.resume,
            concurrency: self.config.parallelism * kind.concurrency_factor(),
            obfuscator: self.config.hide_names.then(|| &*self.obfuscator),
            shutdown: &ctx.shutdown,
            progress: self.config.progress,
        };

        info!("Gathering namespace information");
        let namespaces = namespaces
            .into_iter()
            .map(|ns| {
                let name = ns.name_any();
                (name.clone(), name)
            })
            .collect();
        dispatch(Kind::Namespaces)
            .run(namespaces, &mut report.namespaces, |_, name| {
                namespace::collect(ctx.clone(), name)
            })
            .await?;

        if ctx.shutdown.is_cancelled() {
            return Err(PassError::Cancelled { pass: Kind::Nodes });
        }

        info!("Gathering node information");
        let nodes = self
            .cluster
            .list_nodes()
            .await
            .map_err(|source| PassError::List {
                pass: Kind::Nodes,
                source,
            })?
            .into_iter()
            .map(|node| (node.name_any(), node))
            .collect();
        dispatch(Kind::Nodes)
            .run(nodes, &mut report.nodes, |_, node| {
                node::collect(ctx.clone(), node)
            })
            .await
    }
}
