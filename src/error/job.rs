use crate::error::Error;
use crate::error::serde::SerdeError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JobError {
    /// A status transition was attempted before the queue server assigned a handle.
    #[error("Job for function `{0}` has no handle yet")]
    MissingHandle(String),

    #[error("Unable to decode job workload: {0}")]
    Decode(#[from] SerdeError),

    #[error("Invalid callback descriptor: {0}")]
    InvalidCallback(String),
}
