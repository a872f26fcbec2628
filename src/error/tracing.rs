use crate::error::Error;

/// Failures while installing the tracing subscriber.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TracingError {
    #[error("Invalid tracing level: {0}")]
    Level(#[from] tracing::metadata::ParseLevelError),

    #[error("Invalid trace filter directive: {0}")]
    Directive(#[from] tracing_subscriber::filter::ParseError),

    #[error("Invalid `RUST_LOG` filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::FromEnvError),

    #[error("Unable to install the tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

macro_rules! into_tracing_error {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(value: $source) -> Self {
                    Self::Tracing(TracingError::from(value))
                }
            }
        )+
    };
}

into_tracing_error!(
    tracing::metadata::ParseLevelError,
    tracing_subscriber::filter::ParseError,
    tracing_subscriber::filter::FromEnvError,
    tracing_subscriber::util::TryInitError,
);
