//! A general purpose in-memory cache for generated values.
//!
//! Values are addressed by a [`Namespace`] (usually the identity of the function that
//! generates them) and a content digest of a serializable key. Generation is synchronous;
//! a generator that fails leaves no entry behind, so the next request runs it again.
#![warn(missing_docs)]

use std::any::Any;
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod error;
pub mod mem;
#[cfg(test)]
pub(crate) mod tests;

pub use mem::{CacheState, NamespaceCache};

lazy_static! {
    /// A regex for matching valid namespaces.
    pub static ref NAMESPACE_REGEX: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*\.)*[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// A namespace used for addressing a set of cached items.
///
/// Must match the [`NAMESPACE_REGEX`](static@NAMESPACE_REGEX) regular expression.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    /// Creates a new [`Namespace`].
    ///
    /// # Panics
    ///
    /// Panics if the provided string does not match [`NAMESPACE_REGEX`](static@NAMESPACE_REGEX).
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace: String = namespace.into();
        if !Namespace::validate(&namespace) {
            panic!(
                "invalid namespace, does not match regex {:?}",
                NAMESPACE_REGEX.as_str(),
            );
        }
        Self(namespace)
    }

    /// Returns `true` if the provided string is a valid namespace.
    pub fn validate(namespace: &str) -> bool {
        NAMESPACE_REGEX.is_match(namespace)
    }

    /// Converts the namespace into its string value.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<T: Into<String>> From<T> for Namespace {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl Deref for Namespace {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The content-derived address of a cache entry.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    digest: Vec<u8>,
}

impl CacheKey {
    /// Computes the key of `key` within `namespace`.
    ///
    /// The key is serialized with `flexbuffers` and hashed with SHA-256,
    /// so any serializable type (including ones holding floats) can be used.
    pub fn new<K: Serialize>(namespace: Namespace, key: &K) -> error::Result<Self> {
        let bytes = flexbuffers::to_vec(key)?;
        Ok(Self {
            namespace,
            digest: hash(&bytes),
        })
    }

    /// The namespace of the entry.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The SHA-256 digest of the serialized key.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, hex::encode(&self.digest[..8]))
    }
}

/// A cacheable object.
///
/// # Examples
///
/// ```
/// use cache::{Cacheable, NamespaceCache};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize, Serialize)]
/// pub struct Params {
///     param1: u64,
///     param2: f64,
/// };
///
/// impl Cacheable for Params {
///     const NAMESPACE: &'static str = "params";
///     type Output = f64;
///     type Error = anyhow::Error;
///
///     fn generate(&self) -> anyhow::Result<f64> {
///         if self.param1 == 0 {
///             anyhow::bail!("param1 must be nonzero");
///         }
///         Ok(self.param2 / self.param1 as f64)
///     }
/// }
///
/// let mut cache = NamespaceCache::new();
/// let value = cache.get(Params { param1: 4, param2: 2. }).unwrap();
/// assert_eq!(*value, 0.5);
/// assert!(cache.get(Params { param1: 0, param2: 2. }).is_err());
/// ```
pub trait Cacheable: Serialize + Any {
    /// The namespace in which outputs of this type are stored.
    const NAMESPACE: &'static str;
    /// The output produced by generating the object.
    type Output: Send + Sync + Any;
    /// The error type returned by [`Cacheable::generate`].
    type Error: From<error::Error>;

    /// Generates the output of the cacheable object.
    fn generate(&self) -> std::result::Result<Self::Output, Self::Error>;
}

/// A cacheable object whose generator needs access to mutable state.
///
/// The state usually owns the cache itself, allowing generators to request
/// other cached values while they run.
///
/// **Note:** The state is not used to determine whether the object should be regenerated. As
/// such, it should not impact the output of this function but rather should only be used to
/// store collateral or reuse computation from other function calls.
pub trait CacheableWithState<S>: Serialize + Any {
    /// The namespace in which outputs of this type are stored.
    const NAMESPACE: &'static str;
    /// The output produced by generating the object.
    type Output: Send + Sync + Any;
    /// The error type returned by [`CacheableWithState::generate_with_state`].
    type Error: From<error::Error>;

    /// Generates the output of the cacheable object using `state`.
    fn generate_with_state(&self, state: &mut S) -> std::result::Result<Self::Output, Self::Error>;
}

pub(crate) fn hash(val: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(val);
    hasher.finalize()[..].into()
}
