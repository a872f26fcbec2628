use crate::error::serde::SerdeError;
use crate::job::Job;
use crate::queue::Priority;
use crate::queue::client::Client;
use serde_json::Value;
use tracing::{debug, error};

/// Builds and submits the follow-up job a finished job asked for.
#[derive(Clone)]
pub struct CallbackChainer {
    client: Client,
}

impl CallbackChainer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The callback job for `job`, if it declared one.
    ///
    /// Its positional params are the job's status record, the callback's extra args, then the
    /// return value (or `null`). It is a normal-priority background job carrying `job`'s log
    /// prefix.
    pub fn build(&self, job: &Job, result: Option<&Value>) -> Result<Option<Job>, SerdeError> {
        let Some(callback) = job.callback.as_ref() else {
            return Ok(None);
        };
        let mut params = Vec::with_capacity(callback.args.len() + 2);
        params.push(serde_json::to_value(job.status_record())?);
        params.extend(callback.args.iter().cloned());
        params.push(result.cloned().unwrap_or(Value::Null));

        let callback = Job::builder()
            .function(callback.function.clone())
            .params(Value::Array(params))
            .log_prefix(job.log_prefix.clone())
            .priority(Priority::Normal)
            .background(true)
            .build();
        Ok(Some(callback))
    }

    /// Build and submit the callback. Failures are logged and otherwise ignored.
    pub async fn send(&self, job: &Job, result: Option<&Value>) {
        let handle = job.handle().unwrap_or_default();
        let mut callback = match self.build(job, result) {
            Ok(Some(callback)) => callback,
            Ok(None) => return,
            Err(err) => {
                error!("Failed to send callback for job {handle}: {err}");
                return;
            }
        };
        match callback.send(&self.client).await {
            Ok(callback_handle) => {
                debug!(
                    callback = %callback.function,
                    callback_handle,
                    "Callback submitted"
                );
            }
            Err(err) => error!("Failed to send callback for job {handle}: {err}"),
        }
    }
}
