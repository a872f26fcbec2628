use crate::config::reconnect::Reconnect;
use serde_derive::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;
use strum_macros::{EnumString, IntoStaticStr};
use validator::Validate;

#[serde_as]
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Queue {
    /// Queue servers as `host:port`. The first reachable one is used.
    #[validate(length(min = 1))]
    pub servers: Vec<String>,

    /// Timeout (in milliseconds) for a single fetch or admin round trip.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub timeout: Duration,

    /// Feature flags applied to every new worker connection.
    #[serde(default)]
    pub options: Vec<QueueOption>,

    #[serde(default)]
    #[validate(nested)]
    pub reconnect: Reconnect,
}

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[non_exhaustive]
pub enum QueueOption {
    /// Ask the server to include the unique id of each job it hands out.
    GrabUniq,
    /// Do not block inside the transport when no job is available.
    NonBlocking,
}
