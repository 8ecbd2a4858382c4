//! Error types produced by loaders and the fan-out helpers.

use std::fmt;

use thiserror::Error;

/// Outcome of a single key request.
///
/// Cloned into every Thunk a dispatch touches, so variants only carry owned, cheap data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The key's text could not be turned into the id the data source expects.
    #[error("invalid key '{key}': {message}")]
    KeyParse { key: String, message: String },

    /// The data source returned no entry for a requested key.
    #[error("{entity} not found, id: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The batch function failed as a whole.
    #[error("fetch failed: {message}")]
    Fetch { message: String },

    /// The batch function returned a different number of results than it was given keys.
    #[error("result count mismatch: expected {expected} results, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// The execution scope was cancelled or the loader went away before the key settled.
    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn fetch(message: impl fmt::Display) -> Self {
        LoadError::Fetch { message: message.to_string() }
    }

    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        LoadError::NotFound { entity, key: key.into() }
    }
}

pub type LoadResult<V> = Result<V, LoadError>;

/// A failed child of a fan-out, tagged with the identity of the key it was loaded by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildError {
    pub key: String,
    pub error: LoadError,
}

/// Every child failure collected by one fan-out, in the order the keys were derived.
///
/// Renders one `<key>: <error>` line per child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    errors: Vec<ChildError>,
}

impl AggregateError {
    pub fn new(errors: Vec<ChildError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[ChildError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<ChildError> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for child in &self.errors {
            if !first {
                f.write_str("\n")?;
            }
            first = false;
            write!(f, "{}: {}", child.key, child.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
