use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    batch_function::BatchFunction,
    cache::LoaderState,
    error::{LoadError, LoadResult},
    key::Key,
    loader_op::LoaderOp,
    thunk::Resolver,
};

/// The in-flight fetch was abandoned because the execution scope was cancelled.
struct Cancelled;

/// A `LoaderWorker` is the task that actually calls the `BatchFunction`.
///
/// Once started, it runs in a loop until the parent Loader aborts its `JoinHandle`, drops the
/// request queue tx channel, or the execution scope is cancelled.
///
/// One cycle through the loop is a "coalescing window" followed by a dispatch:
///
/// 1. Wait for a [`LoaderOp::Dispatch`] signal, sent by the `Loader` when a key lands in an
///    empty pending batch.
/// 2. Keep the window open: yield to the scheduler `yield_count` times (and sleep for `delay`, if
///    configured) so that sibling tasks running in the same tick can enqueue their keys, then
///    drain any further signals from the queue.
/// 3. Take the whole pending batch out of the shared state and call the `BatchFunction` with it
///    (in chunks of `max_batch_size`, if configured). Each key's Thunk is resolved positionally
///    from the returned list. A failed call or a list of the wrong length settles every Thunk of
///    the chunk to the same error.
///
/// If the window closes with an empty pending batch, no call is made.
pub(crate) struct LoaderWorker<K, V, F, ContextT>
where
    K: Key,
    V: 'static + Send + Sync + Debug + Clone,
    F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    ContextT: Send + Sync + 'static,
{
    state: Arc<Mutex<LoaderState<K, V>>>,
    request_rx: mpsc::UnboundedReceiver<LoaderOp>,
    context: ContextT,
    yield_count: usize,
    delay: Option<Duration>,
    max_batch_size: Option<usize>,
    cancel: CancellationToken,
    phantom_batch_function: PhantomData<F>,
}

impl<K, V, F, ContextT> LoaderWorker<K, V, F, ContextT>
where
    K: Key,
    V: 'static + Send + Sync + Debug + Clone,
    F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    ContextT: Send + Sync + 'static,
{
    pub(crate) fn new(
        state: Arc<Mutex<LoaderState<K, V>>>,
        request_rx: mpsc::UnboundedReceiver<LoaderOp>,
        context: ContextT,
        config: &crate::config::LoaderConfig,
    ) -> Self {
        Self {
            state,
            request_rx,
            context,
            yield_count: config.yield_count,
            delay: config.delay,
            // A zero cap would never shrink the batch.
            max_batch_size: config.max_batch_size.map(|max| max.max(1)),
            // A token nobody else holds never fires.
            cancel: config.cancel.clone().unwrap_or_else(CancellationToken::new),
            phantom_batch_function: PhantomData,
        }
    }

    pub(crate) async fn start(mut self) {
        tracing::info!("Starting LoaderWorker.");
        loop {
            // Async await until we receive the first op.
            let op = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Execution scope cancelled. Terminating LoaderWorker.");
                    self.state.lock().close();
                    return;
                }
                op = self.request_rx.recv() => op,
            };
            match op {
                None => {
                    tracing::info!("Tx channel closed. Terminating LoaderWorker.");
                    self.state.lock().close();
                    return;
                }
                Some(LoaderOp::Dispatch) => {}
            }

            if self.hold_window().await.is_err() {
                tracing::debug!("Execution scope cancelled. Terminating LoaderWorker.");
                self.state.lock().close();
                return;
            }
            // Flush remainder of the op queue before executing load.
            while let Some(Some(_)) = self.request_rx.recv().now_or_never() {}

            let batch = self.state.lock().take_pending();
            if batch.is_empty() {
                continue;
            }
            if self.execute_load(batch).await.is_err() {
                tracing::debug!("Execution scope cancelled mid-fetch. Terminating LoaderWorker.");
                self.state.lock().close();
                return;
            }
        }
    }

    async fn hold_window(&mut self) -> Result<(), Cancelled> {
        for _ in 0..self.yield_count {
            tokio::task::yield_now().await;
        }
        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }

    async fn execute_load(&mut self, mut batch: Vec<(K, Resolver<V>)>) -> Result<(), Cancelled> {
        while !batch.is_empty() {
            let rest = match self.max_batch_size {
                Some(max) if batch.len() > max => batch.split_off(max),
                _ => Vec::new(),
            };
            let chunk = std::mem::replace(&mut batch, rest);
            if let Err(cancelled) = self.dispatch(chunk).await {
                settle_all(batch.into_iter().map(|(_, r)| r), Err(LoadError::Cancelled));
                return Err(cancelled);
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, batch), fields(batch_size = batch.len()))]
    async fn dispatch(&mut self, batch: Vec<(K, Resolver<V>)>) -> Result<(), Cancelled> {
        let (keys, resolvers): (Vec<K>, Vec<Resolver<V>>) = batch.into_iter().unzip();
        tracing::debug!(?keys, "dispatching batch");
        #[cfg(feature = "stats")]
        self.state.lock().stats.record_load_exec(keys.len() as u32);

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            fetched = F::load(&keys, &self.context) => Some(fetched),
        };

        match fetched {
            None => {
                settle_all(resolvers, Err(LoadError::Cancelled));
                return Err(Cancelled);
            }
            Some(Ok(results)) if results.len() == resolvers.len() => {
                tracing::debug!(?results);
                for (resolver, result) in resolvers.into_iter().zip(results) {
                    resolver.resolve(result);
                }
            }
            Some(Ok(results)) => {
                let error = LoadError::CountMismatch { expected: keys.len(), actual: results.len() };
                tracing::error!(%error, ?keys, "BatchFunction broke the result count contract");
                #[cfg(feature = "stats")]
                self.state.lock().stats.record_load_failure();
                settle_all(resolvers, Err(error));
            }
            Some(Err(error)) => {
                tracing::warn!(%error, ?keys, "BatchFunction failed");
                #[cfg(feature = "stats")]
                self.state.lock().stats.record_load_failure();
                settle_all(resolvers, Err(error));
            }
        }
        Ok(())
    }
}

fn settle_all<V, I>(resolvers: I, outcome: LoadResult<V>)
where
    V: Clone,
    I: IntoIterator<Item = Resolver<V>>,
{
    for resolver in resolvers {
        resolver.resolve(outcome.clone());
    }
}
