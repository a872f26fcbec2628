use crate::util::serde::default_true;
use serde_derive::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;
use validator::Validate;

#[serde_as]
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Worker {
    /// Maximum lifetime (in seconds) of a worker process. The actual deadline is jittered by up
    /// to 10% in either direction. A lifetime past the latest representable date means no deadline.
    #[serde(default)]
    #[serde_as(as = "Option<serde_with::DurationSeconds>")]
    pub lifetime: Option<Duration>,

    /// Whether the lifetime deadline is allowed to stop the worker. The initial value of
    /// [`Lifecycle::set_allow_die`](crate::worker::Lifecycle::set_allow_die).
    #[serde(default = "default_true")]
    pub allow_die: bool,

    /// Pause (in seconds) after a failed fetch before the next one.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub error_backoff: Duration,
}
