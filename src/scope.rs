use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    batch_function::BatchFunction, config::LoaderConfig, error::LoadError, key::Key,
    loader::Loader,
};

/// The lifetime of one execution, e.g. one incoming query.
///
/// Builds the loaders used while resolving it and owns the cancellation signal they share.
/// Cancelling the scope, timing it out, or dropping it settles every Thunk still outstanding
/// in its loaders to [`LoadError::Cancelled`].
///
/// Applications typically wrap a `Scope` together with one typed [`Loader`] per entity kind in
/// a struct of their own and pass that to every resolver.
#[derive(Debug)]
pub struct Scope {
    cancel: CancellationToken,
    config: LoaderConfig,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    /// Uses `config` as the template for every loader built by this scope. A cancellation token in
    /// `config` becomes the parent of the scope's own token.
    pub fn with_config(config: LoaderConfig) -> Self {
        let cancel = match &config.cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        Self { cancel, config }
    }

    pub fn loader<K, V, F, ContextT>(&self, f: F, context: ContextT) -> Loader<K, V>
    where
        K: Key,
        V: 'static + Send + Sync + Debug + Clone,
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    {
        Loader::with_config(f, context, self.loader_config())
    }

    pub fn named_loader<K, V, F, ContextT>(
        &self,
        name: &'static str,
        f: F,
        context: ContextT,
    ) -> Loader<K, V>
    where
        K: Key,
        V: 'static + Send + Sync + Debug + Clone,
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    {
        Loader::with_config(f, context, self.loader_config().with_name(name))
    }

    fn loader_config(&self) -> LoaderConfig {
        self.config.clone().with_cancellation(self.cancel.child_token())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `fut`, cancelling the whole scope if it has not finished within `timeout`.
    pub async fn run_with_timeout<T, Fut>(&self, timeout: Duration, fut: Fut) -> Result<T, LoadError>
    where
        Fut: Future<Output = T>,
    {
        tokio::select! {
            out = fut => Ok(out),
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(?timeout, "execution scope timed out, cancelling");
                self.cancel();
                Err(LoadError::Cancelled)
            }
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
