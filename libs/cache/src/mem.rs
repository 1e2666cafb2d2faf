//! In-memory caching utilities.

use std::{
    any::Any,
    collections::HashMap,
    sync::Arc,
};

use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    CacheKey, Cacheable, CacheableWithState, Namespace,
};

type Entries = HashMap<Vec<u8>, Arc<dyn Any + Send + Sync>>;

/// A cache that stores generated values by namespace and key content.
///
/// Each namespace holds values of a single type. Keys are hashed through their
/// serialized form, so two keys with identical content always address the same entry.
#[derive(Default, Debug)]
pub struct NamespaceCache {
    /// A map from namespace to another map from key digest to value.
    namespaces: HashMap<Namespace, Entries>,
}

impl NamespaceCache {
    /// Creates a new, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The total number of cached values across all namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(HashMap::len).sum()
    }

    /// Returns `true` if no values are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards every cached value.
    pub fn clear(&mut self) {
        debug!(entries = self.len(), "clearing cache");
        self.namespaces.clear();
    }

    /// Returns `true` if a value is cached for `key` in `namespace`.
    pub fn contains<K: Serialize>(&self, namespace: impl Into<Namespace>, key: &K) -> Result<bool> {
        let key = CacheKey::new(namespace.into(), key)?;
        Ok(self
            .namespaces
            .get(key.namespace())
            .is_some_and(|entries| entries.contains_key(key.digest())))
    }

    /// Looks up a previously generated value.
    ///
    /// Returns [`Error::TypeMismatch`] if the entry exists but holds a value of another type.
    pub fn lookup<V: Send + Sync + Any>(&self, key: &CacheKey) -> Result<Option<Arc<V>>> {
        let Some(value) = self
            .namespaces
            .get(key.namespace())
            .and_then(|entries| entries.get(key.digest()))
        else {
            return Ok(None);
        };
        value
            .clone()
            .downcast::<V>()
            .map(Some)
            .map_err(|_| Error::TypeMismatch(key.to_string()))
    }

    /// Stores a value, replacing any previous value for the same key.
    pub fn insert<V: Send + Sync + Any>(&mut self, key: CacheKey, value: Arc<V>) {
        let CacheKey { namespace, digest } = key;
        self.namespaces
            .entry(namespace)
            .or_default()
            .insert(digest, value);
    }

    /// Ensures that a value corresponding to `key` is generated, using `generate_fn`
    /// to generate it if it has not already been generated.
    ///
    /// A more general counterpart to [`NamespaceCache::get`].
    ///
    /// If `generate_fn` fails, the error is returned and nothing is stored.
    ///
    /// # Examples
    ///
    /// ```
    /// use cache::{error::Error, NamespaceCache};
    ///
    /// let mut cache = NamespaceCache::new();
    /// let value = cache
    ///     .generate::<_, _, Error>("example", 5u64, |key| Ok(*key * 2))
    ///     .unwrap();
    /// assert_eq!(*value, 10);
    ///
    /// // The generator does not run again for the same key.
    /// let value = cache
    ///     .generate::<_, u64, Error>("example", 5u64, |_| unreachable!())
    ///     .unwrap();
    /// assert_eq!(*value, 10);
    /// ```
    pub fn generate<K: Serialize, V: Send + Sync + Any, E: From<Error>>(
        &mut self,
        namespace: impl Into<Namespace>,
        key: K,
        generate_fn: impl FnOnce(&K) -> std::result::Result<V, E>,
    ) -> std::result::Result<Arc<V>, E> {
        let cache_key = CacheKey::new(namespace.into(), &key)?;
        if let Some(value) = self.lookup(&cache_key)? {
            trace!(key = %cache_key, "cache hit");
            return Ok(value);
        }
        debug!(key = %cache_key, "generating value");
        let value = Arc::new(generate_fn(&key)?);
        self.insert(cache_key, value.clone());
        Ok(value)
    }

    /// Gets the output of a [`Cacheable`] object, generating it if necessary.
    pub fn get<K: Cacheable>(&mut self, key: K) -> std::result::Result<Arc<K::Output>, K::Error> {
        self.generate(K::NAMESPACE, key, |key| key.generate())
    }
}

/// State that owns a [`NamespaceCache`].
///
/// Generators that run against such state may request other cached values
/// while they are running.
pub trait CacheState {
    /// The cache owned by the state.
    fn cache(&mut self) -> &mut NamespaceCache;
}

impl CacheState for NamespaceCache {
    fn cache(&mut self) -> &mut NamespaceCache {
        self
    }
}

/// Ensures that a value corresponding to `key` is generated, passing `state` to
/// `generate_fn` if it has to run.
///
/// The cache is not borrowed while `generate_fn` runs, so the generator may
/// itself call back into [`generate_with_state`] with the same state.
pub fn generate_with_state<S: CacheState, K: Serialize, V: Send + Sync + Any, E: From<Error>>(
    state: &mut S,
    namespace: impl Into<Namespace>,
    key: K,
    generate_fn: impl FnOnce(&K, &mut S) -> std::result::Result<V, E>,
) -> std::result::Result<Arc<V>, E> {
    let cache_key = CacheKey::new(namespace.into(), &key)?;
    if let Some(value) = state.cache().lookup(&cache_key)? {
        trace!(key = %cache_key, "cache hit");
        return Ok(value);
    }
    debug!(key = %cache_key, "generating value with state");
    let value = Arc::new(generate_fn(&key, state)?);
    state.cache().insert(cache_key, value.clone());
    Ok(value)
}

/// Gets the output of a [`CacheableWithState`] object, generating it if necessary.
pub fn get_with_state<S: CacheState, K: CacheableWithState<S>>(
    state: &mut S,
    key: K,
) -> std::result::Result<Arc<K::Output>, K::Error> {
    generate_with_state(state, K::NAMESPACE, key, |key, state| {
        key.generate_with_state(state)
    })
}
