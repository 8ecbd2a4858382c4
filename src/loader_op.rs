/// Signals sent from a [`crate::Loader`] to its [`crate::loader_worker::LoaderWorker`].
///
/// Keys themselves never travel through the channel: they are enqueued directly into the
/// shared pending batch under the loader lock. The channel only tells the worker that a new
/// batch has started, which opens the coalescing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderOp {
    /// A key was enqueued into an empty pending batch.
    Dispatch,
}
