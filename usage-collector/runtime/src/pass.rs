//! Bounded fan-out of per-entity workers.

use crate::{core::Obfuscator, k8s, progress::Progress};
use parking_lot::Mutex;
use std::{collections::BTreeMap, fmt, future::Future, sync::Arc};
use thiserror::Error;
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Namespaces,
    Nodes,
}

#[derive(Debug, Error)]
pub enum PassError {
    #[error("{pass} collection was cancelled")]
    Cancelled { pass: Kind },

    #[error("failed to list {pass}: {source}")]
    List {
        pass: Kind,
        #[source]
        source: k8s::Error,
    },

    #[error("encountered {count} errors processing {pass}")]
    Failed { pass: Kind, count: usize },
}

/// Why a single worker produced no result.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("cancelled")]
    Cancelled,

    #[error("failed to {action}: {source}")]
    Api {
        action: &'static str,
        #[source]
        source: k8s::Error,
    },
}

/// Settings shared by every worker dispatched in a pass.
#[derive(Debug)]
pub struct Dispatch<'a> {
    pub kind: Kind,

    /// Skip entities whose key is already in the results.
    pub resume: bool,

    /// Maximum number of workers in flight.
    pub concurrency: usize,

    /// Hashes result keys when set.
    pub obfuscator: Option<&'a Obfuscator>,

    pub shutdown: &'a CancellationToken,

    pub progress: bool,
}

// === impl Kind ===

impl Kind {
    /// Concurrency per available processor.
    pub fn concurrency_factor(&self) -> usize {
        match self {
            Self::Namespaces => 4,
            Self::Nodes => 2,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Namespaces => "Namespaces",
            Self::Nodes => "Nodes",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespaces => f.write_str("namespaces"),
            Self::Nodes => f.write_str("nodes"),
        }
    }
}

// === impl Dispatch ===

impl Dispatch<'_> {
    /// Runs `worker` for each `(name, item)` and records its output in `results`, keyed by the
    /// (possibly hashed) name.
    ///
    /// Every worker has finished by the time this returns. Workers that fail leave no entry;
    /// cancelled workers are not counted as failures.
    pub async fn run<I, T, F, Fut>(
        &self,
        entities: Vec<(String, I)>,
        results: &mut BTreeMap<String, T>,
        worker: F,
    ) -> Result<(), PassError>
    where
        T: Send + 'static,
        F: Fn(String, I) -> Fut,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let pass = self.kind;
        if entities.is_empty() {
            warn!(%pass, "No {pass} found");
            return Ok(());
        }

        let total = entities.len();
        let concurrency = self.concurrency.max(1);
        info!(%pass, total, concurrency, "Processing {pass}");

        let progress = Progress::new(pass.label(), total, self.progress);
        let shared = Arc::new(Mutex::new(std::mem::take(results)));
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (errors_tx, mut errors_rx) = mpsc::channel(total);
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        for (name, item) in entities {
            if self.shutdown.is_cancelled() {
                cancelled = true;
                break;
            }

            let key = match self.obfuscator {
                Some(obfuscator) => obfuscator.obfuscate(&name),
                None => name.clone(),
            };
            if self.resume && shared.lock().contains_key(&key) {
                debug!(%pass, %name, "Already collected");
                progress.inc();
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let task = worker(name.clone(), item);
            let shared = shared.clone();
            let errors_tx = errors_tx.clone();
            let progress = progress.clone();
            tasks.spawn(async move {
                match task.await {
                    Ok(value) => {
                        shared.lock().insert(key, value);
                    }
                    Err(error) => {
                        let _ = errors_tx.send((name, error)).await;
                    }
                }
                progress.inc();
                drop(permit);
            });
        }

        // The channel closes once every worker has dropped its sender.
        drop(errors_tx);
        let mut failures = 0;
        while let Some((name, error)) = errors_rx.recv().await {
            match error {
                TaskError::Cancelled => cancelled = true,
                error => {
                    warn!(%pass, %name, %error, "Failed to collect");
                    failures += 1;
                }
            }
        }
        // A worker that panicked neither recorded a result nor reported an error.
        while let Some(res) = tasks.join_next().await {
            if let Err(error) = res {
                warn!(%pass, %error, "Worker did not complete");
                failures += 1;
            }
        }
        progress.finish();
        *results = std::mem::take(&mut *shared.lock());

        if cancelled {
            if failures > 0 {
                warn!(%pass, failures, "Errors encountered before cancellation");
            }
            return Err(PassError::Cancelled { pass });
        }
        if failures > 0 {
            return Err(PassError::Failed {
                pass,
                count: failures,
            });
        }
        Ok(())
    }
}

/// Awaits an API call unless the shutdown token fires first.
pub async fn cancellable<T>(
    shutdown: &CancellationToken,
    action: &'static str,
    call: impl Future<Output = k8s::Result<T>>,
) -> Result<T, TaskError> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(TaskError::Cancelled),
        res = call => res.map_err(|source| TaskError::Api { action, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatch<'a>(shutdown: &'a CancellationToken, resume: bool) -> Dispatch<'a> {
        Dispatch {
            kind: Kind::Namespaces,
            resume,
            concurrency: 2,
            obfuscator: None,
            shutdown,
            progress: false,
        }
    }

    fn entities(names: &[&str]) -> Vec<(String, ())> {
        names.iter().map(|n| (n.to_string(), ())).collect()
    }

    #[tokio::test]
    async fn collects_every_entity() {
        let shutdown = CancellationToken::new();
        let mut results = BTreeMap::new();
        dispatch(&shutdown, false)
            .run(entities(&["a", "b", "c"]), &mut results, |name, ()| async move {
                Ok(name.len())
            })
            .await
            .unwrap();
        assert_eq!(results.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn counts_failures() {
        let shutdown = CancellationToken::new();
        let mut results = BTreeMap::new();
        let err = dispatch(&shutdown, false)
            .run(
                entities(&["ok", "bad-1", "bad-2"]),
                &mut results,
                |name, ()| async move {
                    if name.starts_with("bad") {
                        Err(TaskError::Api {
                            action: "list pods",
                            source: k8s::Error::Unavailable(name),
                        })
                    } else {
                        Ok(())
                    }
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PassError::Failed {
                pass: Kind::Namespaces,
                count: 2
            }
        ));
        assert_eq!(err.to_string(), "encountered 2 errors processing namespaces");
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn panicking_workers_are_failures() {
        let shutdown = CancellationToken::new();
        let mut results = BTreeMap::new();
        let err = dispatch(&shutdown, false)
            .run(entities(&["ok", "boom"]), &mut results, |name, ()| async move {
                if name == "boom" {
                    panic!("worker for {name} panicked");
                }
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                PassError::Failed {
                    pass: Kind::Namespaces,
                    count: 1
                }
            ),
            "{err:?}"
        );
        assert_eq!(results.keys().collect::<Vec<_>>(), ["ok"]);
    }

    #[tokio::test]
    async fn resume_skips_present_keys() {
        let shutdown = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut results = BTreeMap::from([("a".to_string(), 0)]);
        dispatch(&shutdown, true)
            .run(entities(&["a", "b"]), &mut results, |_, ()| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results, BTreeMap::from([("a".to_string(), 0), ("b".to_string(), 1)]));
    }

    #[tokio::test]
    async fn obfuscates_keys() {
        let shutdown = CancellationToken::new();
        let obfuscator = Obfuscator::new();
        let mut results = BTreeMap::new();
        Dispatch {
            obfuscator: Some(&obfuscator),
            ..dispatch(&shutdown, false)
        }
        .run(entities(&["default"]), &mut results, |_, ()| async { Ok(()) })
        .await
        .unwrap();
        assert!(results.contains_key("37a8eec1ce19687d132fe29051dca629"));
    }

    #[tokio::test]
    async fn empty_passes_succeed() {
        let shutdown = CancellationToken::new();
        let mut results = BTreeMap::<String, ()>::new();
        dispatch(&shutdown, false)
            .run(Vec::<(String, ())>::new(), &mut results, |_, ()| async {
                Ok(())
            })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn cancellation_is_not_a_failure() {
        let shutdown = CancellationToken::new();
        let mut results = BTreeMap::<String, ()>::new();
        let err = dispatch(&shutdown, false)
            .run(entities(&["a", "b", "c"]), &mut results, |_, ()| {
                let shutdown = shutdown.clone();
                async move {
                    shutdown.cancel();
                    Err(TaskError::Cancelled)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PassError::Cancelled {
                pass: Kind::Namespaces
            }
        ));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let shutdown = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut results = BTreeMap::new();
        let names = (0..16).map(|i| (format!("ns-{i}"), ())).collect();
        dispatch(&shutdown, false)
            .run(names, &mut results, |_, ()| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let n = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(n, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 16);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
