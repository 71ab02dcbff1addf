//! Istio usage report model
//!
//! The collector walks every namespace and node in a cluster once and records how much of the
//! requested (and, when the metrics API answers, consumed) CPU and memory belongs to application
//! containers versus injected `istio-proxy` sidecars:
//!
//! ```text
//! [ ClusterReport ] -> [ NamespaceReport ] -> [ ResourceSummary ] -> regular / istio buckets
//!                   -> [ NodeReport ] -> capacity / actual
//! ```
//!
//! The report is the only thing persisted between runs: resume mode reloads it and skips every
//! namespace or node whose key is already present, so the serialized field names are part of the
//! tool's contract.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod obfuscate;
pub mod report;

pub use self::{
    obfuscate::Obfuscator,
    report::{
        Bucket, ClusterReport, NamespaceReport, NodeReport, NodeResources, ResourceSummary,
        Resources, Tally,
    },
};

/// The name of the sidecar container injected by Istio.
pub const PROXY_CONTAINER_NAME: &str = "istio-proxy";

/// Reported when a node's topology or instance type cannot be resolved from its labels.
pub const UNKNOWN: &str = "unknown";
