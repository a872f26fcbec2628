use crate::error::Error;
use std::ops::RangeInclusive;

/// Driver error codes that mean the link to the database server was lost (`CR_*` client errors
/// in MySQL terms).
pub const CONNECTION_LOST_CODES: RangeInclusive<i32> = 2000..=2013;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DbError {
    /// An error reported by the database driver, with the driver's numeric error code.
    #[error("[{code}] {message}")]
    Driver { code: i32, message: String },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl DbError {
    pub fn driver(code: i32, message: impl Into<String>) -> Self {
        DbError::Driver {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            DbError::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_connection_lost(&self) -> bool {
        self.code()
            .map(|code| CONNECTION_LOST_CODES.contains(&code))
            .unwrap_or_default()
    }
}
