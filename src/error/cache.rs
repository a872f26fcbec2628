use crate::error::Error;
use crate::error::mutex::MutexError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("The cache is unavailable: {0}")]
    Unavailable(String),

    /// The value stored under the key is not a counter.
    #[error("Cached value for `{0}` is not an integer")]
    NotANumber(String),

    #[error("Counter `{0}` is already at its maximum value")]
    Overflow(String),

    #[error(transparent)]
    Mutex(#[from] MutexError),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
