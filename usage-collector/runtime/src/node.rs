use crate::{
    core::{NodeReport, UNKNOWN},
    k8s::{Cluster, Node, ResourceExt},
    pass::TaskError,
    resources,
    retry::RetryError,
    Context,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::warn;

const INSTANCE_TYPE: [&str; 2] = [
    "node.kubernetes.io/instance-type",
    "beta.kubernetes.io/instance-type",
];
const REGION: [&str; 2] = [
    "topology.kubernetes.io/region",
    "failure-domain.beta.kubernetes.io/region",
];
const ZONE: [&str; 2] = [
    "topology.kubernetes.io/zone",
    "failure-domain.beta.kubernetes.io/zone",
];

/// Describes a node's placement and capacity, and its usage when metrics are served.
pub(crate) async fn collect<C: Cluster>(
    ctx: Arc<Context<C>>,
    node: Node,
) -> Result<NodeReport, TaskError> {
    if ctx.shutdown.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let name = node.name_any();
    let labels = node.labels();
    let capacity = node.status.as_ref().and_then(|s| s.capacity.as_ref());
    let report = NodeReport::new(
        label(labels, INSTANCE_TYPE),
        label(labels, REGION),
        label(labels, ZONE),
        resources::capacity(capacity),
    );

    if !ctx.metrics {
        return Ok(report);
    }

    let res = ctx
        .backoff
        .retry(&ctx.shutdown, &name, || ctx.cluster.get_node_metrics(&name))
        .await;
    match res {
        Ok(metrics) => Ok(report.with_actual(resources::usage(Some(&metrics.usage)))),
        Err(RetryError::Cancelled) => Err(TaskError::Cancelled),
        Err(error) => {
            warn!(node = %name, %error, "Failed to get node metrics");
            Ok(report)
        }
    }
}

/// The first non-empty value among `keys`.
fn label(labels: &BTreeMap<String, String>, keys: [&str; 2]) -> String {
    keys.iter()
        .filter_map(|k| labels.get(*k))
        .find(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string())
}
