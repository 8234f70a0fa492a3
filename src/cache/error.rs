use thiserror::Error;

/// Errors raised by the cache layer itself
///
/// Failures of the wrapped compute function never pass through this type;
/// facade methods are generic over the caller's error type and only require
/// `E: From<CacheError>`.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The persistent store rejected a per-entry operation
    #[error("Cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A computed value could not be serialized for storage
    #[error("Failed to encode cached value: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored blob could not be turned back into a value
    #[error("Failed to decode cached value: {0}")]
    Decode(#[source] serde_json::Error),

    /// The configured key argument does not exist on the wrapped function
    #[error("Key argument index {index} is out of range for a function taking {arity} argument(s)")]
    KeyArgument { index: usize, arity: usize },
}
