use serde_derive::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Cache {
    /// Prepended to the job handle to build the retry counter key.
    pub key_prefix: String,

    /// A job whose counter is already above this value is refused.
    #[validate(range(min = 1))]
    pub retry_threshold: i64,
}
