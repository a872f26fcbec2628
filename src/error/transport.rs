use crate::error::Error;

/// Errors reported by a queue transport (client or worker side) or the queue server's admin
/// interface.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The connection to the queue server was lost or could not be established.
    #[error("Lost connection to the queue server: {0}")]
    Connection(String),

    /// The queue server did not answer in time.
    #[error("Timed out waiting for the queue server: {0}")]
    Timeout(String),

    /// The queue server understood the request but refused it.
    #[error("The queue server rejected the request: {0}")]
    Rejected(String),

    #[error("Unexpected response from the queue server: {0}")]
    Protocol(String),

    #[error("Operation `{0}` is not supported by this transport")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Whether the failure signals a lost link that a reconnect may fix.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_) | TransportError::Timeout(_) | TransportError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::TransportError;
    use rstest::rstest;

    #[rstest]
    #[case(TransportError::Connection("reset".to_owned()), true)]
    #[case(TransportError::Timeout("grab".to_owned()), true)]
    #[case(TransportError::Io(std::io::Error::other("broken pipe")), true)]
    #[case(TransportError::Rejected("no such function".to_owned()), false)]
    #[case(TransportError::Protocol("garbage".to_owned()), false)]
    #[case(TransportError::Unsupported("do".to_owned()), false)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn is_transient(#[case] error: TransportError, #[case] expected: bool) {
        assert_eq!(error.is_transient(), expected);
    }
}
