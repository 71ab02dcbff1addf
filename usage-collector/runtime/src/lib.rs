//! Collection runtime: CLI, orchestration, workers, and report persistence.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use istio_usage_collector_core as core;
pub use istio_usage_collector_k8s_api as k8s;
pub use istio_usage_collector_k8s_inject as inject;

mod args;
pub mod config;
mod gather;
mod namespace;
mod node;
mod pass;
pub mod persist;
mod progress;
mod resources;
pub mod retry;


pub use self::{
    args::Args,
    config::{Config, Format},
    gather::{Collector, Error},
    pass::{Kind, PassError},
};

/// State shared by the workers of a collection.
pub(crate) struct Context<C> {
    pub cluster: std::sync::Arc<C>,

    /// `None` when webhook configurations could not be read.
    pub injector: Option<inject::Injector>,

    /// Whether the metrics API answered at startup.
    pub metrics: bool,

    pub backoff: retry::Backoff,

    pub shutdown: tokio_util::sync::CancellationToken,
}
