use crate::error::Error;
use std::any::type_name;
use std::sync::PoisonError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MutexError {
    /// Contains the guarded type's name and the poison error's message.
    #[error("Unable to acquire mutex `{0}`; the mutex is poisoned. Err: {1}")]
    Poison(String, String),

    #[error(transparent)]
    Other(#[from] Box<dyn Send + Sync + std::error::Error>),
}

impl<T> From<PoisonError<T>> for MutexError {
    fn from(value: PoisonError<T>) -> Self {
        MutexError::Poison(type_name::<T>().to_string(), value.to_string())
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(value: PoisonError<T>) -> Self {
        MutexError::from(value).into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::PoisonError;

    struct FooStruct;

    #[test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from_poison_error() {
        let error = PoisonError::new(FooStruct);
        let error = crate::error::Error::from(error);
        let message = error.to_string();
        assert!(message.starts_with("Unable to acquire mutex `"));
        assert!(message.contains("FooStruct"));
    }
}
