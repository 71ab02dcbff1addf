use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::AddAssign};

/// The top-level record written for a single cluster.
///
/// Maps are ordered so that two runs over the same cluster serialize identically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub name: String,

    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceReport>,

    #[serde(default)]
    pub nodes: BTreeMap<String, NodeReport>,

    #[serde(default)]
    pub has_metrics: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceReport {
    pub pods: usize,

    /// Set when the namespace is labeled for injection or when any of its pods actually runs an
    /// injected proxy.
    pub is_istio_injected: bool,

    pub resources: ResourceSummary,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub regular: Bucket,

    /// Only present when at least one injected proxy container was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istio: Option<Bucket>,
}

/// Totals for a class of containers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub containers: usize,

    pub request: Resources,

    /// Observed usage, only present when the metrics API answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Resources>,
}

/// CPU in cores and memory in GiB.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: f64,
    pub memory_gb: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub instance_type: String,
    pub region: String,
    pub zone: String,
    pub resources: NodeResources,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResources {
    pub capacity: Resources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Resources>,
}

/// Accumulates per-container figures for a namespace before they are folded into a
/// [`ResourceSummary`].
#[derive(Debug, Default)]
pub struct Tally {
    regular: Totals,
    proxy: Totals,
}

#[derive(Debug, Default)]
struct Totals {
    containers: usize,
    request: Resources,
    actual: Resources,
}

// === impl ClusterReport ===

impl ClusterReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

// === impl NodeReport ===

impl NodeReport {
    pub fn new(
        instance_type: impl Into<String>,
        region: impl Into<String>,
        zone: impl Into<String>,
        capacity: Resources,
    ) -> Self {
        Self {
            instance_type: instance_type.into(),
            region: region.into(),
            zone: zone.into(),
            resources: NodeResources {
                capacity,
                actual: None,
            },
        }
    }

    pub fn with_actual(mut self, actual: Resources) -> Self {
        self.resources.actual = Some(actual);
        self
    }
}

// === impl Resources ===

impl Resources {
    pub const ZERO: Self = Self {
        cpu: 0.0,
        memory_gb: 0.0,
    };

    pub fn new(cpu: f64, memory_gb: f64) -> Self {
        Self { cpu, memory_gb }
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Self) {
        self.cpu += rhs.cpu;
        self.memory_gb += rhs.memory_gb;
    }
}

// === impl Tally ===

impl Tally {
    /// Records a container from a pod spec along with its requests.
    pub fn add_container(&mut self, proxy: bool, request: Resources) {
        let totals = self.totals_mut(proxy);
        totals.containers += 1;
        totals.request += request;
    }

    /// Records a container's observed usage.
    pub fn add_usage(&mut self, proxy: bool, usage: Resources) {
        self.totals_mut(proxy).actual += usage;
    }

    pub fn proxy_containers(&self) -> usize {
        self.proxy.containers
    }

    /// Folds the totals into a summary. `observed` indicates whether usage was collected at all,
    /// in which case `actual` is reported even when it sums to zero.
    pub fn into_summary(self, observed: bool) -> ResourceSummary {
        let Self { regular, proxy } = self;
        ResourceSummary {
            regular: regular.into_bucket(observed),
            istio: (proxy.containers > 0).then(|| proxy.into_bucket(observed)),
        }
    }

    fn totals_mut(&mut self, proxy: bool) -> &mut Totals {
        if proxy {
            &mut self.proxy
        } else {
            &mut self.regular
        }
    }
}

impl Totals {
    fn into_bucket(self, observed: bool) -> Bucket {
        Bucket {
            containers: self.containers,
            request: self.request,
            actual: observed.then_some(self.actual),
        }
    }
}
