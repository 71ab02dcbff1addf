#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cluster;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod quantity;

pub use self::{
    cluster::{Cluster, KubeCluster},
    error::{Error, Result},
    labels::{Labels, Selector},
    metrics::{ContainerMetrics, NodeMetrics, PodMetrics},
};
pub use k8s_openapi::{
    api::{
        admissionregistration::v1::{MutatingWebhook, MutatingWebhookConfiguration},
        core::v1::{Container, Namespace, Node, NodeStatus, Pod, PodSpec, ResourceRequirements},
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, LabelSelectorRequirement},
    },
};
pub use kube::api::{ObjectMeta, ResourceExt};
