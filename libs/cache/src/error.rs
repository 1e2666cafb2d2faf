//! Cache error types.

/// The [`Error`] result type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error raised by the cache itself, as opposed to a generator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The key could not be serialized for hashing.
    #[error("failed to serialize cache key: {0}")]
    Serialize(#[from] flexbuffers::SerializationError),
    /// An entry exists for the key but holds a value of a different type.
    #[error("cache entry `{0}` holds a value of a different type")]
    TypeMismatch(String),
}
