use crate::job::{FailureInfo, Job};
use async_trait::async_trait;
use tracing::warn;

/// Notified whenever a dispatched job fails, after it was marked [`Failed`][crate::job::JobStatus::Failed].
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ExceptionObserver: Send + Sync {
    async fn on_failure(&self, job: &Job, failure: &FailureInfo);
}

/// Logs the operator-facing failure message.
#[derive(Debug, Default, Clone)]
pub struct LogObserver;

#[async_trait]
impl ExceptionObserver for LogObserver {
    async fn on_failure(&self, job: &Job, failure: &FailureInfo) {
        let message = job
            .failure_message()
            .unwrap_or_else(|| failure.message.clone());
        warn!(error_kind = %failure.error_kind, "{message}");
    }
}
