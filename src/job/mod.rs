use crate::error::WorkhorseResult;
use crate::error::job::JobError;
use crate::error::serde::SerdeError;
use crate::job::payload::{Callback, Payload};
use crate::queue::client::Client;
use crate::queue::{Delivery, Priority};
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::serde_as;
use strum_macros::{Display, IntoStaticStr};
use tracing::debug;

pub mod payload;

#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum JobStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Failed,
}

/// Why a job failed: the kind of error and its message.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    pub error_kind: String,
    pub message: String,
}

impl FailureInfo {
    pub fn new(error_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_kind: error_kind.into(),
            message: message.into(),
        }
    }
}

/// Snapshot of a job handed to its callback as the first positional argument.
#[serde_as]
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub function: String,
    pub job_handle: Option<String>,
    pub status: JobStatus,
    pub failure_info: Option<FailureInfo>,
    #[serde_as(as = "serde_with::TimestampSeconds<i64>")]
    pub last_modified: DateTime<Utc>,
}

/// A unit of work: what to run, with which parameters, and where to report afterwards.
///
/// The queue server assigns the handle. Status transitions require it, and a job carries
/// [`FailureInfo`] exactly when it is [`JobStatus::Failed`].
#[derive(Debug, Clone, bon::Builder)]
pub struct Job {
    #[builder(into)]
    pub function: String,
    #[builder(default)]
    pub params: Value,
    /// String, list of strings, or null. Rendered into every log line emitted for the job.
    #[builder(default)]
    pub log_prefix: Value,
    pub callback: Option<Callback>,
    #[builder(default)]
    pub priority: Priority,
    #[builder(default = true)]
    pub background: bool,
    #[builder(into)]
    pub unique: Option<String>,
    #[builder(skip)]
    handle: Option<String>,
    #[builder(skip)]
    status: JobStatus,
    #[builder(skip = Utc::now())]
    last_modified: DateTime<Utc>,
    #[builder(skip)]
    failure: Option<FailureInfo>,
}

impl Job {
    /// Rebuild the job the queue server handed out.
    pub fn from_delivery(delivery: &Delivery) -> Result<Self, JobError> {
        let payload = Payload::decode(&delivery.workload)?;
        let mut job = Job::builder()
            .function(delivery.function.clone())
            .params(payload.params)
            .log_prefix(payload.log_prefix)
            .maybe_callback(payload.callback)
            .maybe_unique(delivery.unique.clone())
            .build();
        job.handle = Some(delivery.handle.clone());
        Ok(job)
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn set_handle(&mut self, handle: impl Into<String>) {
        self.handle = Some(handle.into());
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn failure(&self) -> Option<&FailureInfo> {
        self.failure.as_ref()
    }

    pub fn payload(&self) -> Payload {
        Payload {
            params: self.params.clone(),
            log_prefix: self.log_prefix.clone(),
            callback: self.callback.clone(),
        }
    }

    pub fn encode(&self) -> Result<String, SerdeError> {
        self.payload().encode()
    }

    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::InProgress, None)
    }

    pub fn done(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Done, None)
    }

    pub fn failed(&mut self, failure: FailureInfo) -> Result<(), JobError> {
        self.transition(JobStatus::Failed, Some(failure))
    }

    fn transition(
        &mut self,
        status: JobStatus,
        failure: Option<FailureInfo>,
    ) -> Result<(), JobError> {
        if self.handle.is_none() {
            return Err(JobError::MissingHandle(self.function.clone()));
        }
        self.status = status;
        self.failure = failure;
        self.last_modified = Utc::now();
        Ok(())
    }

    pub fn status_record(&self) -> StatusRecord {
        StatusRecord {
            function: self.function.clone(),
            job_handle: self.handle.clone(),
            status: self.status,
            failure_info: self.failure.clone(),
            last_modified: self.last_modified,
        }
    }

    /// Operator-facing failure text: `[YYYY/MM/DD HH:MM:SS] [function] message`.
    pub fn failure_message(&self) -> Option<String> {
        self.failure.as_ref().map(|failure| {
            format!(
                "[{}] [{}] {}",
                self.last_modified.format("%Y/%m/%d %H:%M:%S"),
                self.function,
                failure.message
            )
        })
    }

    /// Submit the job. Background submissions return the handle, which is also stored on the
    /// job; foreground submissions return the worker's result.
    pub async fn send(&mut self, client: &Client) -> WorkhorseResult<String> {
        let workload = self.encode()?;
        let result = client
            .send(
                &self.function,
                &workload,
                self.priority,
                self.background,
                self.unique.as_deref(),
            )
            .await?;
        if self.background {
            debug!(function = %self.function, handle = %result, "Job submitted");
            self.handle = Some(result.clone());
        }
        Ok(result)
    }
}
