use std::collections::HashMap;
use std::mem;

use crate::{
    error::{LoadError, LoadResult},
    key::Key,
    thunk::{self, Resolver, Thunk},
};

#[cfg(feature = "stats")]
use crate::worker_stats::WorkerStats;

/// The mutable state shared between a `Loader` and its `LoaderWorker`.
///
/// Always accessed under the loader's single mutex, which makes "return the cached Thunk or
/// enqueue the key" atomic across concurrent callers.
///
/// Invariants:
/// * an identity has at most one cache slot, and slots are never replaced or evicted;
/// * every key in `pending` has a slot, and `pending` holds each identity at most once;
/// * a key leaves `pending` only when taken by the worker for dispatch, so it is fetched at most
///   once for the lifetime of the loader.
pub(crate) struct LoaderState<K, V> {
    cache: HashMap<String, Thunk<V>>,
    pending: Vec<(K, Resolver<V>)>,
    closed: bool,
    #[cfg(feature = "stats")]
    pub(crate) stats: WorkerStats,
}

/// Result of looking a key up in the [`LoaderState`].
pub(crate) struct Lookup<V> {
    pub thunk: Thunk<V>,
    /// The key was enqueued into an empty pending batch, so the worker needs waking.
    pub starts_batch: bool,
}

impl<K, V> LoaderState<K, V>
where
    K: Key,
{
    #[allow(unused_variables)]
    pub fn new(name: &str) -> Self {
        Self {
            cache: HashMap::new(),
            pending: Vec::new(),
            closed: false,
            #[cfg(feature = "stats")]
            stats: WorkerStats::new(name.to_owned()),
        }
    }

    /// Returns the cached Thunk for `key`, creating and enqueueing one on a miss.
    pub fn load(&mut self, key: K) -> Lookup<V> {
        if let Some(thunk) = self.cache.get(key.identity()) {
            #[cfg(feature = "stats")]
            self.stats.record_cache_hits(1);
            return Lookup { thunk: thunk.clone(), starts_batch: false };
        }
        if self.closed {
            return Lookup { thunk: Thunk::settled(Err(LoadError::Cancelled)), starts_batch: false };
        }

        let (resolver, thunk) = thunk::pending();
        self.cache.insert(key.identity().to_owned(), thunk.clone());
        let starts_batch = self.pending.is_empty();
        self.pending.push((key, resolver));
        Lookup { thunk, starts_batch }
    }

    /// Caches an already known outcome. Returns false, changing nothing, if the identity is
    /// already cached.
    pub fn prime(&mut self, key: &K, outcome: LoadResult<V>) -> bool {
        if self.cache.contains_key(key.identity()) {
            return false;
        }
        self.cache.insert(key.identity().to_owned(), Thunk::settled(outcome));
        true
    }

    /// Hands the whole pending batch to the caller, leaving it empty.
    pub fn take_pending(&mut self) -> Vec<(K, Resolver<V>)> {
        mem::take(&mut self.pending)
    }

    /// Settles every pending key to [`LoadError::Cancelled`] and refuses further work.
    pub fn close(&mut self) {
        self.closed = true;
        for (_, resolver) in self.take_pending() {
            resolver.resolve(Err(LoadError::Cancelled));
        }
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg(test)]
    pub fn pending_identities(&self) -> Vec<&str> {
        self.pending.iter().map(|(k, _)| k.identity()).collect()
    }
}
