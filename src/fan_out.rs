//! Fan-out/fan-in of child requests for one resolution node.
//!
//! A resolver hands over its parent value and a rule deriving the child keys from it. The keys
//! are requested from the loader right away, before the returned future is first polled, so
//! sibling resolvers invoked in the same tick land their keys in the same batch. The future then
//! waits on every child concurrently and yields the children in key order, or an
//! [`AggregateError`] carrying every child failure if any child failed.
//!
//! Nothing here coordinates across nodes; batching across siblings is entirely the loader's job.

use std::fmt::Debug;
use std::future::Future;

use futures::future;

use crate::{
    error::{AggregateError, ChildError},
    key::Key,
    loader::Loader,
    thunk::Thunk,
};

/// Loads the children of `parent` with a single [`Loader::load_many`] call.
pub fn fan_out<P, K, V, D>(
    loader: &Loader<K, V>,
    parent: &P,
    derive: D,
) -> impl Future<Output = Result<Vec<V>, AggregateError>> + Send + 'static
where
    P: ?Sized,
    K: Key,
    V: 'static + Send + Sync + Debug + Clone,
    D: FnOnce(&P) -> Vec<K>,
{
    let keys = derive(parent);
    let identities = keys.iter().map(|k| k.identity().to_owned()).collect::<Vec<_>>();
    let thunks = loader.load_many(keys);
    join_thunks(identities.into_iter().zip(thunks))
}

/// Loads the children of `parent` with one [`Loader::load`] call per key.
///
/// Batches exactly like [`fan_out`].
pub fn fan_out_each<P, K, V, D>(
    loader: &Loader<K, V>,
    parent: &P,
    derive: D,
) -> impl Future<Output = Result<Vec<V>, AggregateError>> + Send + 'static
where
    P: ?Sized,
    K: Key,
    V: 'static + Send + Sync + Debug + Clone,
    D: FnOnce(&P) -> Vec<K>,
{
    let pending = derive(parent)
        .into_iter()
        .map(|key| (key.identity().to_owned(), loader.load(key)))
        .collect::<Vec<_>>();
    join_thunks(pending)
}

/// Waits on every Thunk concurrently and assembles the outcome in input order.
///
/// Never fails fast: all Thunks are awaited, so the error lists every failing child.
pub async fn join_thunks<V, I>(children: I) -> Result<Vec<V>, AggregateError>
where
    V: Clone,
    I: IntoIterator<Item = (String, Thunk<V>)>,
{
    let (identities, thunks): (Vec<String>, Vec<Thunk<V>>) = children.into_iter().unzip();
    let outcomes = future::join_all(thunks.iter().map(|thunk| thunk.wait())).await;

    let mut values = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();
    for (key, outcome) in identities.into_iter().zip(outcomes) {
        match outcome {
            Ok(value) => values.push(value),
            Err(error) => errors.push(ChildError { key, error }),
        }
    }
    if errors.is_empty() {
        Ok(values)
    } else {
        tracing::debug!(failed = errors.len(), succeeded = values.len(), "fan-out failed");
        Err(AggregateError::new(errors))
    }
}
