use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{LoadError, LoadResult};
use crate::key::Key;

/// What a [`BatchFunction`] hands back for one invocation.
///
/// `Ok` carries one outcome per requested key, positionally matched to the keys it was given.
/// `Err` means the call as a whole failed and every key of the batch receives that error.
pub type BatchResult<V> = Result<Vec<LoadResult<V>>, LoadError>;

/// A `BatchFunction` defines the method through which some `Loader` fetches batched data from
/// some resource. It receives the deduplicated keys requested during the `Loader`'s most recent
/// coalescing window, in first-request order, and some user defined context struct.
///
/// The returned list must have exactly one entry per key, in the same order. A list of any other
/// length is a contract violation: every key of that batch settles to
/// [`LoadError::CountMismatch`]. Data sources that answer with an unordered set can be adapted
/// with [`ordered_by_keys`].
///
/// Retrying is the batch function's business; the `Loader` calls it once per batch.
///
/// Multiple `BatchFunctions` (and therefore loaders) can share the same context (likely through
/// an `Arc`).
#[async_trait]
pub trait BatchFunction<K, V> {
    type Context;
    async fn load(keys: &[K], context: &Self::Context) -> BatchResult<V>;
}

/// Lines up an unordered set of `(identity, value)` pairs with the keys that were requested.
///
/// Keys without a matching entry get [`LoadError::NotFound`] naming `entity`; they do not affect
/// the other keys.
pub fn ordered_by_keys<K, V, I>(entity: &'static str, keys: &[K], loaded: I) -> Vec<LoadResult<V>>
where
    K: Key,
    V: Clone,
    I: IntoIterator<Item = (String, V)>,
{
    let loaded = loaded.into_iter().collect::<HashMap<_, _>>();
    keys.iter()
        .map(|k| {
            loaded
                .get(k.identity())
                .cloned()
                .ok_or_else(|| LoadError::not_found(entity, k.identity()))
        })
        .collect()
}
