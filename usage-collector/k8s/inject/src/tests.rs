use super::*;
use maplit::btreemap;

/// The webhooks installed by a default-revision Istio control plane.
const ISTIO_DEFAULT: &str = r#"
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata:
  name: istio-sidecar-injector
webhooks:
- name: rev.namespace.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system, path: /inject, port: 443 }
  namespaceSelector:
    matchExpressions:
    - { key: istio.io/rev, operator: In, values: [default] }
    - { key: istio-injection, operator: DoesNotExist }
  objectSelector:
    matchExpressions:
    - { key: sidecar.istio.io/inject, operator: NotIn, values: ["false"] }
- name: rev.object.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system, path: /inject, port: 443 }
  namespaceSelector:
    matchExpressions:
    - { key: istio.io/rev, operator: DoesNotExist }
    - { key: istio-injection, operator: DoesNotExist }
  objectSelector:
    matchExpressions:
    - { key: sidecar.istio.io/inject, operator: NotIn, values: ["false"] }
    - { key: istio.io/rev, operator: In, values: [default] }
- name: namespace.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system, path: /inject, port: 443 }
  namespaceSelector:
    matchExpressions:
    - { key: istio-injection, operator: In, values: [enabled] }
  objectSelector:
    matchExpressions:
    - { key: sidecar.istio.io/inject, operator: NotIn, values: ["false"] }
- name: object.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system, path: /inject, port: 443 }
  namespaceSelector:
    matchExpressions:
    - { key: istio-injection, operator: DoesNotExist }
    - { key: istio.io/rev, operator: DoesNotExist }
  objectSelector:
    matchExpressions:
    - { key: sidecar.istio.io/inject, operator: In, values: ["true"] }
    - { key: istio.io/rev, operator: DoesNotExist }
"#;

const OTHER_WEBHOOK: &str = r#"
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata:
  name: cert-manager-webhook
webhooks:
- name: webhook.cert-manager.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: cert-manager-webhook, namespace: cert-manager, path: /mutate }
"#;

fn config(yaml: &str) -> MutatingWebhookConfiguration {
    serde_yaml::from_str(yaml).expect("webhook configuration must parse")
}

fn istio_injector() -> Injector {
    Injector::new(
        &[config(ISTIO_DEFAULT), config(OTHER_WEBHOOK)],
        Arc::new(SelectorMatchCache::new()),
    )
}

fn labels(map: std::collections::BTreeMap<&'static str, &'static str>) -> Labels {
    map.into_iter().collect()
}

#[test]
fn filters_non_istio_configurations() {
    assert!(is_istio_webhook(&config(ISTIO_DEFAULT)));
    assert!(!is_istio_webhook(&config(OTHER_WEBHOOK)));
    assert_eq!(istio_injector().len(), 4);

    let none = Injector::new(&[config(OTHER_WEBHOOK)], Default::default());
    assert!(none.is_empty());
    assert!(!none.would_inject(&Labels::default(), &Labels::default()));
}

#[test]
fn default_istio_policy() {
    let injector = istio_injector();
    for (pod, ns, expected, msg) in [
        (
            btreemap! {},
            btreemap! { "istio-injection" => "enabled" },
            true,
            "namespace enabled",
        ),
        (
            btreemap! {},
            btreemap! { "istio.io/rev" => "default" },
            true,
            "namespace revision",
        ),
        (
            btreemap! { "sidecar.istio.io/inject" => "true" },
            btreemap! {},
            true,
            "pod opt-in",
        ),
        (
            btreemap! { "istio.io/rev" => "default" },
            btreemap! {},
            true,
            "pod revision",
        ),
        (btreemap! {}, btreemap! {}, false, "no labels"),
        (
            btreemap! { "sidecar.istio.io/inject" => "false" },
            btreemap! { "istio-injection" => "enabled" },
            false,
            "pod opt-out in enabled namespace",
        ),
        (
            btreemap! { "sidecar.istio.io/inject" => "true" },
            btreemap! { "istio-injection" => "disabled" },
            false,
            "namespace disabled overrides pod opt-in",
        ),
        (
            btreemap! {},
            btreemap! { "istio.io/rev" => "canary" },
            false,
            "unknown revision",
        ),
        (
            btreemap! { "app" => "web" },
            btreemap! { "istio-injection" => "enabled", "team" => "a" },
            true,
            "unrelated labels are ignored",
        ),
    ] {
        assert_eq!(
            injector.would_inject(&labels(pod), &labels(ns)),
            expected,
            "{msg}"
        );
    }
}

#[test]
fn disabled_namespace_is_never_injected() {
    let injector = Injector::new(
        &[config(
            r#"
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata: { name: permissive }
webhooks:
- name: all.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system }
"#,
        )],
        Default::default(),
    );

    // Webhooks without any selector inject everything.
    assert!(injector.would_inject(&Labels::default(), &Labels::default()));

    for value in ["disabled", "false", ""] {
        let ns = labels(btreemap! { "istio-injection" => value });
        assert!(!injector.would_inject(&Labels::default(), &ns), "{value:?}");
    }
}

#[test]
fn verdicts_explain_vetoes() {
    let injector = istio_injector();
    let ns = labels(btreemap! { "istio-injection" => "enabled" });
    let pod = labels(btreemap! { "sidecar.istio.io/inject" => "false" });

    let namespace_hook = &injector.webhooks[2];
    assert_eq!(namespace_hook.name, "namespace.sidecar-injector.istio.io");
    assert_eq!(
        injector.verdict(namespace_hook, &pod, &ns),
        Verdict::Veto("sidecar.istio.io/inject=false".to_string())
    );

    // A pod selecting a revision explicitly is excluded by the opt-in entry.
    let object_hook = &injector.webhooks[3];
    let pod = labels(btreemap! { "istio.io/rev" => "canary" });
    assert_eq!(
        injector.verdict(object_hook, &pod, &Labels::default()),
        Verdict::Veto("istio.io/rev is set".to_string())
    );
}

#[test]
fn entries_are_independent() {
    // The first entry vetoes the pod, the second still injects it.
    let injector = Injector::new(
        &[config(
            r#"
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata: { name: split }
webhooks:
- name: strict.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system }
  namespaceSelector:
    matchExpressions:
    - { key: mesh, operator: In, values: ["on"] }
  objectSelector:
    matchExpressions:
    - { key: tier, operator: NotIn, values: [batch] }
- name: batch.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system }
  namespaceSelector:
    matchExpressions:
    - { key: mesh, operator: In, values: ["on"] }
  objectSelector:
    matchExpressions:
    - { key: tier, operator: In, values: [batch] }
"#,
        )],
        Default::default(),
    );

    let ns = labels(btreemap! { "mesh" => "on" });
    assert!(injector.would_inject(&labels(btreemap! { "tier" => "batch" }), &ns));
    assert!(injector.would_inject(&labels(btreemap! { "tier" => "web" }), &ns));
    assert!(!injector.would_inject(&labels(btreemap! { "tier" => "web" }), &Labels::default()));
}

#[test]
fn match_labels_alone_do_not_inject() {
    let labeled = r#"
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata: { name: labeled }
webhooks:
- name: labeled.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system }
  namespaceSelector:
    matchLabels: { mesh: "on" }
"#;
    let unrestricted = r#"
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata: { name: unrestricted }
webhooks:
- name: open.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system }
"#;
    let ns = labels(btreemap! { "mesh" => "on" });

    let injector = Injector::new(&[config(labeled)], Default::default());
    assert_eq!(
        injector.verdict(&injector.webhooks[0], &Labels::default(), &ns),
        Verdict::Skip
    );
    assert!(!injector.would_inject(&Labels::default(), &ns));

    // Without any selectors the entry applies to everything.
    let injector = Injector::new(&[config(unrestricted)], Default::default());
    assert!(injector.would_inject(&Labels::default(), &ns));
    assert!(injector.would_inject(&Labels::default(), &Labels::default()));
}

#[test]
fn invalid_selectors_match_nothing() {
    let injector = Injector::new(
        &[config(
            r#"
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata: { name: broken }
webhooks:
- name: broken.sidecar-injector.istio.io
  admissionReviewVersions: [v1]
  sideEffects: None
  clientConfig:
    service: { name: istiod, namespace: istio-system }
  namespaceSelector:
    matchExpressions:
    - { key: istio-injection, operator: In }
"#,
        )],
        Default::default(),
    );
    let ns = labels(btreemap! { "istio-injection" => "enabled" });
    assert!(!injector.would_inject(&Labels::default(), &ns));
}

#[test]
fn evaluations_are_cached() {
    let cache = Arc::new(SelectorMatchCache::new());
    let injector = Injector::new(&[config(ISTIO_DEFAULT)], cache.clone());
    let ns = labels(btreemap! { "istio-injection" => "enabled" });
    let pod = labels(btreemap! { "app" => "web" });

    assert!(injector.would_inject(&pod, &ns));
    let misses = cache.misses();
    assert!(misses > 0);
    assert_eq!(cache.hits(), 0);

    assert!(injector.would_inject(&pod, &ns));
    assert_eq!(cache.misses(), misses);
    assert_eq!(cache.hits(), misses);
}

#[test]
fn match_info_reports_triggering_label() {
    let selector = Selector::try_from(&LabelSelector {
        match_labels: Some(
            [("team".to_string(), "a".to_string())]
                .into_iter()
                .collect(),
        ),
        match_expressions: Some(vec![
            istio_usage_collector_k8s_api::LabelSelectorRequirement {
                key: "sidecar.istio.io/inject".to_string(),
                operator: "NotIn".to_string(),
                values: Some(vec!["false".to_string()]),
            },
        ]),
    })
    .unwrap();

    let info = match_info(&selector, &labels(btreemap! { "team" => "a" }));
    assert!(info.matched);
    assert_eq!(info.label, None);

    let info = match_info(
        &selector,
        &labels(btreemap! { "team" => "a", "sidecar.istio.io/inject" => "true" }),
    );
    assert_eq!(info.label.as_deref(), Some("sidecar.istio.io/inject=true"));

    let info = match_info(&selector, &labels(btreemap! { "team" => "b" }));
    assert_eq!(info, MatchInfo::default());
}
