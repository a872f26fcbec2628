use crate::error::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("A work with id `{0}` was already registered")]
    AlreadyRegistered(String),

    #[error("No work registered with name `{0}`")]
    UnknownWork(String),

    #[error("Work `{work}` belongs to app `{app}`, but this worker runs app `{expected}`")]
    AppMismatch {
        work: String,
        app: String,
        expected: String,
    },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures to map a queue function name to a handler.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum RoutingError {
    #[error("[{function}] does not exist in [{work}] task map")]
    UnknownFunction { function: String, work: String },

    #[error("[{work}::{method}] is not implemented. [{function}] cannot be mapped")]
    NotImplemented {
        work: String,
        method: String,
        function: String,
    },

    #[error("Cannot map function {function} to undefined method {method}")]
    UndefinedMethod { function: String, method: String },

    #[error("No work is registered for function [{0}]")]
    Unbound(String),
}

/// Failures to bind a job's payload to a handler's declared parameters.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum BindingError {
    #[error("Missing parameter {0} in workload.")]
    MissingParameter(String),

    #[error("Parameter {name} should be array, but {value} was provided.")]
    TypeMismatch { name: String, value: String },
}

impl From<RoutingError> for Error {
    fn from(value: RoutingError) -> Self {
        Self::Work(WorkError::from(value))
    }
}

impl From<BindingError> for Error {
    fn from(value: BindingError) -> Self {
        Self::Work(WorkError::from(value))
    }
}
