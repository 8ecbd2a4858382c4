//! Configuration for a [`crate::Loader`].

use std::borrow::Cow;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunes how a loader's worker closes its coalescing window and dispatches.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Name attached to the worker's tracing span. Defaults to the loader's key/value type names.
    pub name: Option<Cow<'static, str>>,
    /// How many times the worker yields to the scheduler after being woken, before it takes the
    /// pending batch. Keys enqueued by tasks that run during those yields join the same batch.
    ///
    /// Yielding only covers callers polled on the same scheduler tick. On a multi-threaded
    /// runtime, siblings started with `tokio::spawn` may run on other threads after the window
    /// has closed and end up in a second batch. Set `delay` when they must share one.
    pub yield_count: usize,
    /// Optional extra wait before a batch is taken. Cancellation cuts it short.
    pub delay: Option<Duration>,
    /// Upper bound on keys per batch function call. A larger pending batch is split into
    /// consecutive calls. `None` means one call per coalescing window; zero is treated as one.
    pub max_batch_size: Option<usize>,
    /// Execution-scope cancellation. Once fired, the worker stops and every unsettled Thunk of
    /// the loader settles to [`crate::LoadError::Cancelled`].
    pub cancel: Option<CancellationToken>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { name: None, yield_count: 1, delay: None, max_batch_size: None, cancel: None }
    }
}

impl LoaderConfig {
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_yield_count(mut self, yield_count: usize) -> Self {
        self.yield_count = yield_count;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Caps the number of keys passed to one batch function call. Zero is treated as one.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size.max(1));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
