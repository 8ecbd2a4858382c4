//! Batched, deduplicating key loading for nested graph resolution.
//!
//! A [`Loader`] collects the keys requested by concurrently running resolvers and hands them to
//! its [`BatchFunction`] in one call per coalescing window, caching one [`Thunk`] per key
//! identity for the lifetime of the loader. [`fan_out`] drives a loader for all the children of
//! one node and joins their outcomes.

mod batch_function;
mod cache;
mod config;
mod error;
mod fan_out;
mod key;
mod loader;
mod loader_op;
mod loader_worker;
mod scope;
mod thunk;
#[cfg(feature = "stats")]
mod worker_stats;

pub use batch_function::{ordered_by_keys, BatchFunction, BatchResult};
pub use config::LoaderConfig;
pub use error::{AggregateError, ChildError, LoadError, LoadResult};
pub use fan_out::{fan_out, fan_out_each, join_thunks};
pub use key::{Key, ResolverKey};
pub use loader::Loader;
pub use scope::Scope;
pub use thunk::Thunk;
pub use tokio_util::sync::CancellationToken;
