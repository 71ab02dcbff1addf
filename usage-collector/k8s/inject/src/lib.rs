//! Decides whether Istio's sidecar injector would mutate a pod.
//!
//! Istio registers mutating webhooks whose namespace and object selectors encode the injection
//! policy (namespace labels, per-pod opt-in/opt-out, revisions). Rather than submitting anything to
//! the API server, the [`Injector`] evaluates those selectors locally against a pod's and its
//! namespace's labels.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cache;
#[cfg(test)]
mod tests;

pub use self::cache::{MatchInfo, SelectorId, SelectorMatchCache};
use istio_usage_collector_k8s_api::{
    labels::{Operator, Selector},
    LabelSelector, Labels, MutatingWebhook, MutatingWebhookConfiguration,
};
use std::sync::Arc;
use tracing::{trace, warn};

/// Namespace label that enables (or, with any other value, disables) injection.
pub const INJECTION_LABEL: &str = "istio-injection";

pub const INJECTION_ENABLED: &str = "enabled";

/// Namespace label that binds a namespace to a control plane revision.
pub const REVISION_LABEL: &str = "istio.io/rev";

const WEBHOOK_SUFFIX: &str = "istio.io";

/// Evaluates Istio's mutating webhooks against label sets.
#[derive(Debug)]
pub struct Injector {
    webhooks: Vec<Webhook>,
    cache: Arc<SelectorMatchCache>,
}

#[derive(Debug)]
struct Webhook {
    name: String,
    namespace: Scope,
    object: Scope,
}

/// A compiled webhook selector.
#[derive(Debug)]
enum Scope {
    /// The selector is absent or empty and matches everything.
    Unrestricted,
    Selected(SelectorId, Selector),
    /// The selector could not be parsed and matches nothing.
    Invalid,
}

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Inject,
    Veto(String),
    Skip,
}

/// Indicates whether a webhook configuration belongs to Istio.
pub fn is_istio_webhook(config: &MutatingWebhookConfiguration) -> bool {
    config
        .webhooks
        .iter()
        .flatten()
        .any(|wh| wh.name.ends_with(WEBHOOK_SUFFIX))
}

/// Indicates whether a namespace explicitly opts out of injection.
pub fn injection_disabled(ns: &Labels) -> bool {
    ns.get(INJECTION_LABEL)
        .map_or(false, |v| v != INJECTION_ENABLED)
}

// === impl Injector ===

impl Injector {
    /// Compiles the webhooks of every Istio configuration in `configs`; other configurations are
    /// ignored.
    pub fn new(configs: &[MutatingWebhookConfiguration], cache: Arc<SelectorMatchCache>) -> Self {
        let webhooks = configs
            .iter()
            .filter(|c| is_istio_webhook(c))
            .flat_map(|c| c.webhooks.iter().flatten())
            .map(|wh| Webhook::compile(wh, &cache))
            .collect();
        Self { webhooks, cache }
    }

    /// The number of webhook entries considered.
    pub fn len(&self) -> usize {
        self.webhooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.webhooks.is_empty()
    }

    /// Returns true if any webhook would inject a sidecar into a pod with the given labels.
    pub fn would_inject(&self, pod: &Labels, ns: &Labels) -> bool {
        if injection_disabled(ns) {
            return false;
        }

        self.webhooks
            .iter()
            .any(|wh| match self.verdict(wh, pod, ns) {
                Verdict::Inject => true,
                Verdict::Veto(reason) => {
                    trace!(webhook = %wh.name, %reason, "Injection vetoed");
                    false
                }
                Verdict::Skip => false,
            })
    }

    fn verdict(&self, wh: &Webhook, pod: &Labels, ns: &Labels) -> Verdict {
        let ns_match = self.evaluate(&wh.namespace, ns);
        let pod_match = self.evaluate(&wh.object, pod);

        match (ns_match.matched, pod_match.matched) {
            (true, true) => {
                if ns_match.label.is_some()
                    || pod_match.label.is_some()
                    || (wh.namespace.is_unrestricted() && wh.object.is_unrestricted())
                {
                    Verdict::Inject
                } else {
                    Verdict::Skip
                }
            }

            (true, false) => wh.object.opt_out(pod).map_or(Verdict::Skip, Verdict::Veto),

            (false, true) if injection_disabled(ns) => {
                Verdict::Veto(format!("{INJECTION_LABEL} is not {INJECTION_ENABLED}"))
            }

            _ => Verdict::Skip,
        }
    }

    fn evaluate(&self, scope: &Scope, labels: &Labels) -> MatchInfo {
        match scope {
            Scope::Unrestricted => MatchInfo {
                matched: true,
                label: None,
            },
            Scope::Invalid => MatchInfo::default(),
            Scope::Selected(id, selector) => self
                .cache
                .get_or_insert_with(*id, labels.fingerprint(), || {
                    match_info(selector, labels)
                }),
        }
    }
}

fn match_info(selector: &Selector, labels: &Labels) -> MatchInfo {
    if !selector.matches(labels) {
        return MatchInfo::default();
    }

    // Only set-based expressions distinguish a label; `matchLabels` pairs never do.
    let label = selector
        .expressions()
        .filter(|e| matches!(e.operator(), Operator::In | Operator::NotIn))
        .find_map(|e| labels.get(e.key()).map(|v| format!("{}={}", e.key(), v)));

    MatchInfo {
        matched: true,
        label,
    }
}

// === impl Webhook ===

impl Webhook {
    fn compile(wh: &MutatingWebhook, cache: &SelectorMatchCache) -> Self {
        Self {
            name: wh.name.clone(),
            namespace: Scope::compile(&wh.name, wh.namespace_selector.as_ref(), cache),
            object: Scope::compile(&wh.name, wh.object_selector.as_ref(), cache),
        }
    }
}

// === impl Scope ===

impl Scope {
    fn compile(webhook: &str, selector: Option<&LabelSelector>, cache: &SelectorMatchCache) -> Self {
        let Some(selector) = selector else {
            return Self::Unrestricted;
        };
        match Selector::try_from(selector) {
            Ok(sel) if sel.is_empty() => Self::Unrestricted,
            Ok(sel) => Self::Selected(cache.register(), sel),
            Err(error) => {
                warn!(%webhook, %error, "Ignoring webhook selector");
                Self::Invalid
            }
        }
    }

    fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    /// Describes the pod label that explicitly excludes the pod from this selector, if any.
    fn opt_out(&self, pod: &Labels) -> Option<String> {
        let Self::Selected(_, selector) = self else {
            return None;
        };
        selector.expressions().find_map(|e| {
            let value = pod.get(e.key())?;
            match e.operator() {
                Operator::DoesNotExist => Some(format!("{} is set", e.key())),
                Operator::NotIn if e.values().contains(value) => {
                    Some(format!("{}={}", e.key(), value))
                }
                _ => None,
            }
        })
    }
}
