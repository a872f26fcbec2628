use serde_derive::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;
use validator::Validate;

/// How a [`ConnectionManager`][crate::connection::ConnectionManager] recovers from transient
/// failures of the service it manages.
#[serde_as]
#[derive(Debug, Clone, Eq, PartialEq, Validate, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Reconnect {
    /// Total number of attempts, including the first one.
    #[validate(range(min = 1))]
    pub attempts: u32,

    /// Pause (in seconds) between a failed attempt and the reconnect that precedes the next one.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub backoff: Duration,
}

impl Default for Reconnect {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn deserialize() {
        let reconnect: Reconnect =
            serde_json::from_str(r#"{"attempts": 3, "backoff": 2}"#).unwrap();
        assert_eq!(reconnect.attempts, 3);
        assert_eq!(reconnect.backoff, Duration::from_secs(2));
    }

    #[test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn zero_attempts_is_invalid() {
        let reconnect = Reconnect {
            attempts: 0,
            ..Default::default()
        };
        assert!(reconnect.validate().is_err());
    }
}
