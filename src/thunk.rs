use std::fmt::{self, Debug};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{LoadError, LoadResult};

/// Deferred outcome of one key request.
///
/// Handed out by [`crate::Loader::load`] before any fetching happens. It settles exactly once,
/// to a value or an error, and may be awaited any number of times from any number of tasks;
/// every waiter observes the same outcome. Clones share the same slot.
pub struct Thunk<V> {
    rx: watch::Receiver<Option<LoadResult<V>>>,
}

/// The write half of a [`Thunk`]. Consumed on resolution, so a slot can only be filled once.
///
/// Dropping a `Resolver` without resolving settles its Thunk to [`LoadError::Cancelled`].
pub(crate) struct Resolver<V> {
    tx: watch::Sender<Option<LoadResult<V>>>,
}

pub(crate) fn pending<V>() -> (Resolver<V>, Thunk<V>) {
    let (tx, rx) = watch::channel(None);
    (Resolver { tx }, Thunk { rx })
}

impl<V> Resolver<V> {
    pub(crate) fn resolve(self, outcome: LoadResult<V>) {
        self.tx.send_replace(Some(outcome));
    }
}

impl<V> Thunk<V> {
    /// A Thunk that is settled from the start.
    pub fn settled(outcome: LoadResult<V>) -> Self {
        let (_, rx) = watch::channel(Some(outcome));
        Self { rx }
    }

    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl<V: Clone> Thunk<V> {
    /// Returns the outcome if the Thunk has already settled, without suspending.
    pub fn peek(&self) -> Option<LoadResult<V>> {
        self.rx.borrow().clone()
    }

    /// Waits for the Thunk to settle.
    pub async fn wait(&self) -> LoadResult<V> {
        let mut rx = self.rx.clone();
        loop {
            let settled = rx.borrow_and_update().clone();
            if let Some(outcome) = settled {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Write half is gone. It may still have resolved right before dropping.
                return rx.borrow().clone().unwrap_or(Err(LoadError::Cancelled));
            }
        }
    }

    /// Like [`Thunk::wait`], but gives up with [`LoadError::Cancelled`] once `cancel` fires.
    pub async fn wait_or_cancel(&self, cancel: &CancellationToken) -> LoadResult<V> {
        tokio::select! {
            biased;
            outcome = self.wait() => outcome,
            _ = cancel.cancelled() => Err(LoadError::Cancelled),
        }
    }
}

impl<V> Clone for Thunk<V> {
    fn clone(&self) -> Self {
        Self { rx: self.rx.clone() }
    }
}

impl<V: Debug> Debug for Thunk<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.rx.borrow() {
            None => f.write_str("Thunk(<pending>)"),
            Some(outcome) => f.debug_tuple("Thunk").field(outcome).finish(),
        }
    }
}
