use crate::{
    core::{NamespaceReport, Tally, PROXY_CONTAINER_NAME},
    inject::{injection_disabled, INJECTION_ENABLED, INJECTION_LABEL, REVISION_LABEL},
    k8s::{Cluster, Labels, ResourceExt},
    pass::{cancellable, TaskError},
    resources,
    retry::RetryError,
    Context,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// Summarizes the pods in a namespace.
pub(crate) async fn collect<C: Cluster>(
    ctx: Arc<Context<C>>,
    name: String,
) -> Result<NamespaceReport, TaskError> {
    if ctx.shutdown.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let ns = cancellable(
        &ctx.shutdown,
        "get namespace",
        ctx.cluster.get_namespace(&name),
    )
    .await?;
    let ns_labels = Labels::from(ns.metadata.labels.as_ref());

    let pods = cancellable(&ctx.shutdown, "list pods", ctx.cluster.list_pods(&name)).await?;

    let metrics = if ctx.metrics {
        let res = ctx
            .backoff
            .retry(&ctx.shutdown, &name, || ctx.cluster.list_pod_metrics(&name))
            .await;
        match res {
            Ok(metrics) => Some(metrics),
            Err(RetryError::Cancelled) => return Err(TaskError::Cancelled),
            Err(error) => {
                warn!(namespace = %name, %error, "Failed to get pod metrics");
                None
            }
        }
    } else {
        None
    };

    let mut tally = Tally::default();
    let mut injected = HashMap::with_capacity(pods.len());
    for pod in &pods {
        // Without webhook configurations every pod is eligible unless the namespace opts out.
        let pod_injected = match &ctx.injector {
            Some(injector) => {
                injector.would_inject(&Labels::from(pod.metadata.labels.as_ref()), &ns_labels)
            }
            None => !injection_disabled(&ns_labels),
        };
        injected.insert(pod.name_any(), pod_injected);

        for container in pod.spec.iter().flat_map(|spec| &spec.containers) {
            let proxy = pod_injected && container.name == PROXY_CONTAINER_NAME;
            let requests = container
                .resources
                .as_ref()
                .and_then(|r| r.requests.as_ref());
            tally.add_container(proxy, resources::usage(requests));
        }
    }

    if let Some(metrics) = &metrics {
        for pod in metrics {
            let pod_name = pod.name_any();
            let pod_injected = injected.get(&pod_name).copied().unwrap_or_else(|| {
                debug!(namespace = %name, pod = %pod_name, "Metrics reported for an unlisted pod");
                false
            });
            for container in &pod.containers {
                let proxy = pod_injected && container.name == PROXY_CONTAINER_NAME;
                tally.add_usage(proxy, resources::usage(Some(&container.usage)));
            }
        }
    }

    let is_istio_injected = ns_labels.get(INJECTION_LABEL) == Some(INJECTION_ENABLED)
        || ns_labels.contains_key(REVISION_LABEL)
        || tally.proxy_containers() > 0;

    Ok(NamespaceReport {
        pods: pods.len(),
        is_istio_injected,
        resources: tally.into_summary(metrics.is_some()),
    })
}
