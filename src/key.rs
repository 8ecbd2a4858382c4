use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::LoadError;

/// Identifies an entity requested through a [`crate::Loader`].
///
/// Two keys name the same request iff their identities are equal. The identity must be stable
/// and injective over the entities one loader serves; anything else a key carries is payload
/// and plays no part in caching or deduplication.
pub trait Key: 'static + Clone + Debug + Send + Sync {
    fn identity(&self) -> &str;
}

impl Key for String {
    fn identity(&self) -> &str {
        self
    }
}

/// A key built from a raw id rendered as canonical text, plus an arbitrary payload.
///
/// Equality and hashing look at the text only.
#[derive(Clone)]
pub struct ResolverKey<P = ()> {
    key: String,
    payload: P,
}

impl ResolverKey<()> {
    pub fn new(raw: impl Display) -> Self {
        Self { key: raw.to_string(), payload: () }
    }
}

impl<P> ResolverKey<P> {
    pub fn with_payload(raw: impl Display, payload: P) -> Self {
        Self { key: raw.to_string(), payload }
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Converts the key text back into the domain id the data source works with.
    pub fn parse<T>(&self) -> Result<T, LoadError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.key
            .parse::<T>()
            .map_err(|e| LoadError::KeyParse { key: self.key.clone(), message: e.to_string() })
    }
}

impl<P> Key for ResolverKey<P>
where
    P: 'static + Clone + Send + Sync,
{
    fn identity(&self) -> &str {
        &self.key
    }
}

impl<P> PartialEq for ResolverKey<P> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<P> Eq for ResolverKey<P> {}

impl<P> Hash for ResolverKey<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<P> Debug for ResolverKey<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.key, f)
    }
}

impl<P> Display for ResolverKey<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
