use crate::config::reconnect::Reconnect;
use serde_derive::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Default, Validate, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Database {
    #[serde(default)]
    #[validate(nested)]
    pub reconnect: Reconnect,
}
