use crate::{
    core::Resources,
    k8s::{
        quantity::{self, ParseQuantityError},
        Quantity,
    },
};
use std::collections::BTreeMap;
use tracing::warn;

type ResourceList = BTreeMap<String, Quantity>;

/// Requests or observed usage: fractional cores and GiB.
pub(crate) fn usage(list: Option<&ResourceList>) -> Resources {
    Resources::new(
        get(list, "cpu", quantity::cpu_cores),
        get(list, "memory", quantity::memory_gib),
    )
}

/// Node capacity: whole cores and GiB.
pub(crate) fn capacity(list: Option<&ResourceList>) -> Resources {
    Resources::new(
        get(list, "cpu", quantity::whole_cores),
        get(list, "memory", quantity::memory_gib),
    )
}

fn get(
    list: Option<&ResourceList>,
    resource: &str,
    convert: fn(&Quantity) -> Result<f64, ParseQuantityError>,
) -> f64 {
    let Some(q) = list.and_then(|l| l.get(resource)) else {
        return 0.0;
    };
    convert(q).unwrap_or_else(|error| {
        warn!(%resource, quantity = %q.0, %error, "Ignoring invalid quantity");
        0.0
    })
}
