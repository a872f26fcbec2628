pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod db;
pub mod job;
pub mod mutex;
pub mod serde;
pub mod tracing;
pub mod transport;
pub mod work;

use crate::error::cache::CacheError;
#[cfg(feature = "cli")]
use crate::error::cli::CliError;
use crate::error::config::ConfigError;
use crate::error::db::DbError;
use crate::error::job::JobError;
use crate::error::mutex::MutexError;
use crate::error::serde::SerdeError;
use crate::error::tracing::TracingError;
use crate::error::transport::TransportError;
use crate::error::work::WorkError;
use thiserror::Error;

pub type WorkhorseResult<T> = Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Serde(#[from] SerdeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Work(#[from] WorkError),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    Clap(#[from] clap::error::Error),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    Cli(#[from] CliError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tracing(#[from] TracingError),

    #[error(transparent)]
    Mutex(#[from] MutexError),
}
