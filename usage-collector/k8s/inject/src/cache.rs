use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// Identifies a compiled selector within a [`SelectorMatchCache`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SelectorId(u64);

/// The outcome of evaluating a selector against a label set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchInfo {
    pub matched: bool,

    /// The `key=value` label that caused the match, if the selector keys on one.
    pub label: Option<String>,
}

/// Memoizes selector evaluations by selector and label fingerprint.
///
/// Entries are never evicted; the cache lives for a single collection.
#[derive(Debug, Default)]
pub struct SelectorMatchCache {
    next_id: AtomicU64,
    entries: RwLock<HashMap<(SelectorId, String), MatchInfo>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

// === impl SelectorMatchCache ===

impl SelectorMatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an identifier for a newly compiled selector.
    pub fn register(&self) -> SelectorId {
        SelectorId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get_or_insert_with(
        &self,
        id: SelectorId,
        fingerprint: String,
        evaluate: impl FnOnce() -> MatchInfo,
    ) -> MatchInfo {
        let key = (id, fingerprint);
        if let Some(info) = self.entries.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return info.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let info = evaluate();
        self.entries.write().entry(key).or_insert(info).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}
