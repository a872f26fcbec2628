use crate::error::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CliError {
    #[error("Please provide at least one implemented work name to be handled by the worker.")]
    NoWorks,

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
