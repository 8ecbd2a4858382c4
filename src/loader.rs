use std::fmt::Debug;
use std::ops::Drop;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchFunction,
    cache::LoaderState,
    config::LoaderConfig,
    key::Key,
    loader_op::LoaderOp,
    loader_worker::LoaderWorker,
    thunk::Thunk,
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Users call [`Loader::load`] and [`Loader::load_many`] to request values. Both return
/// [`Thunk`]s immediately and never suspend; the keys are collected into a pending batch and the
/// `LoaderWorker` calls the `BatchFunction` once for everything requested during the same
/// coalescing window. Values can be added to the cache out-of-band through [`Loader::prime`].
///
/// The cache lives as long as the `Loader`, which is meant to be built once per execution scope
/// (one incoming query, say) and dropped with it. Cached Thunks, settled or not, are never
/// evicted or refetched, so a key identity reaches the `BatchFunction` at most once per `Loader`.
///
/// Callers can invoke the `Loader` from multiple parallel tasks. The cache and pending batch
/// are guarded by one mutex, so concurrent requests for the same identity share one Thunk.
///
/// Dropping the `Loader` aborts its worker; Thunks that have not settled yet resolve to
/// [`crate::LoadError::Cancelled`].
pub struct Loader<K, V>
where
    K: Key,
    V: 'static + Send + Sync + Debug + Clone,
{
    state: Arc<Mutex<LoaderState<K, V>>>,
    request_tx: mpsc::UnboundedSender<LoaderOp>,
    load_task_handle: tokio::task::JoinHandle<()>,
}

impl<K, V> Drop for Loader<K, V>
where
    K: Key,
    V: 'static + Send + Sync + Debug + Clone,
{
    fn drop(&mut self) {
        self.load_task_handle.abort();
    }
}

impl<K, V> Loader<K, V>
where
    K: Key,
    V: 'static + Send + Sync + Debug + Clone,
{
    /// Creates a new Loader for the provided BatchFunction and Context type.
    ///
    /// Note: the batch function is passed in as a marker for type inference.
    ///
    /// Must be called from within a tokio runtime, which hosts the loader's worker task.
    pub fn new<F, ContextT>(f: F, context: ContextT) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    {
        Self::with_config(f, context, LoaderConfig::default())
    }

    pub fn with_config<F, ContextT>(_: F, context: ContextT, config: LoaderConfig) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| std::any::type_name::<(K, V)>().into());
        let state = Arc::new(Mutex::new(LoaderState::new(&name)));
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = LoaderWorker::<K, V, F, ContextT>::new(state.clone(), rx, context, &config);
        let span = tracing::span!(tracing::Level::TRACE, "LoaderWorker", kv = %name);
        Self {
            state,
            request_tx: tx,
            load_task_handle: tokio::task::spawn(worker.start().instrument(span)),
        }
    }

    /// Requests the value for `key`.
    ///
    /// If the key's identity is already cached, the existing Thunk is returned, whether or not
    /// it has settled. Otherwise the key is enqueued for the next batch.
    pub fn load(&self, key: K) -> Thunk<V> {
        let lookup = {
            let mut state = self.state.lock();
            #[cfg(feature = "stats")]
            state.stats.record_load_request(1);
            state.load(key)
        };
        if lookup.starts_batch {
            self.wake_worker();
        }
        lookup.thunk
    }

    /// Requests many values at once. Equivalent to calling [`Loader::load`] for each key in
    /// order; repeated identities get clones of the same Thunk.
    pub fn load_many<I>(&self, keys: I) -> Vec<Thunk<V>>
    where
        I: IntoIterator<Item = K>,
    {
        let mut starts_batch = false;
        let thunks = {
            let mut state = self.state.lock();
            keys.into_iter()
                .map(|key| {
                    #[cfg(feature = "stats")]
                    state.stats.record_load_request(1);
                    let lookup = state.load(key);
                    starts_batch |= lookup.starts_batch;
                    lookup.thunk
                })
                .collect::<Vec<_>>()
        };
        if starts_batch {
            self.wake_worker();
        }
        thunks
    }

    /// Adds a value to the cache.
    ///
    /// Returns false and leaves the cache untouched if the key was already requested or primed.
    pub fn prime(&self, key: K, value: V) -> bool {
        self.state.lock().prime(&key, Ok(value))
    }

    fn wake_worker(&self) {
        if let Err(e) = self.request_tx.send(LoaderOp::Dispatch) {
            tracing::error!(?e, "LoaderWorker is gone, cancelling pending keys");
            self.state.lock().close();
        }
    }
}
