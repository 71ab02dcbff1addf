use crate::{
    error::Result,
    metrics::{NodeMetrics, PodMetrics},
};
use k8s_openapi::api::{
    admissionregistration::v1::MutatingWebhookConfiguration,
    core::v1::{Namespace, Node, Pod},
};
use kube::api::{Api, ListParams};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// The cluster reads the collector depends on.
#[async_trait::async_trait]
pub trait Cluster: Send + Sync + 'static {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn list_pod_metrics(&self, namespace: &str) -> Result<Vec<PodMetrics>>;

    async fn get_node_metrics(&self, name: &str) -> Result<NodeMetrics>;

    async fn list_mutating_webhooks(&self) -> Result<Vec<MutatingWebhookConfiguration>>;

    /// Indicates whether the metrics API is served by the cluster.
    async fn metrics_available(&self) -> bool;
}

/// A [`Cluster`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: kube::Client,
}

// === impl KubeCluster ===

impl KubeCluster {
    const PAGE_SIZE: u32 = 500;

    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    async fn list_all<K>(api: Api<K>) -> Result<Vec<K>>
    where
        K: kube::Resource + Clone + Debug + DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut params = ListParams::default().limit(Self::PAGE_SIZE);
        loop {
            let page = api.list(&params).await?;
            items.extend(page.items);
            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => params = params.continue_token(&token),
                _ => return Ok(items),
            }
        }
    }
}

#[async_trait::async_trait]
impl Cluster for KubeCluster {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        Self::list_all(Api::all(self.client.clone())).await
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let api = Api::<Namespace>::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        Self::list_all(Api::namespaced(self.client.clone(), namespace)).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Self::list_all(Api::all(self.client.clone())).await
    }

    async fn list_pod_metrics(&self, namespace: &str) -> Result<Vec<PodMetrics>> {
        Self::list_all(Api::namespaced(self.client.clone(), namespace)).await
    }

    async fn get_node_metrics(&self, name: &str) -> Result<NodeMetrics> {
        let api = Api::<NodeMetrics>::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn list_mutating_webhooks(&self) -> Result<Vec<MutatingWebhookConfiguration>> {
        Self::list_all(Api::all(self.client.clone())).await
    }

    async fn metrics_available(&self) -> bool {
        let api = Api::<NodeMetrics>::all(self.client.clone());
        match api.list(&ListParams::default().limit(1)).await {
            Ok(_) => true,
            Err(error) => {
                debug!(%error, "Metrics API is not available");
                false
            }
        }
    }
}
