use crate::config::reconnect::Reconnect;
use crate::connection::ConnectionManager;
use crate::error::WorkhorseResult;
use crate::queue::{ClientConnector, ClientTransport, Primitive, Priority};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Submits jobs to the queue server. Cloning is cheap; all clones share one connection.
#[derive(Clone)]
pub struct Client {
    manager: Arc<Mutex<ConnectionManager<ClientConnector>>>,
}

impl Client {
    pub fn new(transport: Arc<dyn ClientTransport>, reconnect: Reconnect) -> Self {
        Self {
            manager: Arc::new(Mutex::new(ConnectionManager::new(
                ClientConnector::new(transport),
                reconnect,
            ))),
        }
    }

    /// Open (or re-open) the connection to the queue server.
    pub async fn connect(&self) -> WorkhorseResult<()> {
        self.manager.lock().await.connect().await?;
        Ok(())
    }

    /// Submit `workload` for `function`. Returns the job handle for background jobs and the
    /// worker's result for foreground jobs.
    #[instrument(skip_all, fields(function = function))]
    pub async fn send(
        &self,
        function: &str,
        workload: &str,
        priority: Priority,
        background: bool,
        unique: Option<&str>,
    ) -> WorkhorseResult<String> {
        let primitive = Primitive::select(priority, background);
        debug!(%primitive, "Submitting job");

        let function = function.to_owned();
        let workload = workload.to_owned();
        let unique = unique.map(ToOwned::to_owned);
        let result = self
            .manager
            .lock()
            .await
            .with_retry(|connection| {
                let function = function.clone();
                let workload = workload.clone();
                let unique = unique.clone();
                async move {
                    connection
                        .submit(primitive, &function, &workload, unique)
                        .await
                }
                .boxed()
            })
            .await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::error::transport::TransportError;
    use crate::queue::{ClientConnection, MockClientConnection, MockClientTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn transient_failures_are_retried() {
        let submissions = Arc::new(AtomicUsize::new(0));
        let mut transport = MockClientTransport::new();
        let counter = submissions.clone();
        transport.expect_connect().times(4).returning(move || {
            let counter = counter.clone();
            let mut connection = MockClientConnection::new();
            connection
                .expect_submit()
                .withf(|primitive, function, _, unique| {
                    *primitive == Primitive::Do && function == "app.work.sum" && unique.is_none()
                })
                .returning(move |_, _, workload, _| {
                    if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(TransportError::Connection("server went away".to_string()))
                    } else {
                        Ok(format!("sum of {workload}"))
                    }
                });
            Ok(Box::new(connection) as Box<dyn ClientConnection>)
        });

        let client = Client::new(Arc::new(transport), Reconnect::default());
        let start = Instant::now();

        let result = client
            .send("app.work.sum", "1+2", Priority::Normal, false, None)
            .await
            .unwrap();

        assert_eq!(result, "sum of 1+2");
        assert_eq!(submissions.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn background_submission_returns_handle() {
        let mut transport = MockClientTransport::new();
        transport.expect_connect().times(1).returning(|| {
            let mut connection = MockClientConnection::new();
            connection
                .expect_submit()
                .withf(|primitive, function, workload, unique| {
                    *primitive == Primitive::DoHighBackground
                        && function == "app.work.echo"
                        && workload == "payload"
                        && unique.as_deref() == Some("dedupe")
                })
                .times(1)
                .returning(|_, _, _, _| Ok("H:host:1".to_string()));
            Ok(Box::new(connection) as Box<dyn ClientConnection>)
        });

        let client = Client::new(Arc::new(transport), Reconnect::default());
        let handle = client
            .send("app.work.echo", "payload", Priority::High, true, Some("dedupe"))
            .await
            .unwrap();

        assert_eq!(handle, "H:host:1");
    }

    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn rejection_is_not_retried() {
        let mut transport = MockClientTransport::new();
        transport.expect_connect().times(1).returning(|| {
            let mut connection = MockClientConnection::new();
            connection
                .expect_submit()
                .times(1)
                .returning(|_, _, _, _| Err(TransportError::Rejected("too big".to_string())));
            Ok(Box::new(connection) as Box<dyn ClientConnection>)
        });

        let client = Client::new(Arc::new(transport), Reconnect::default());
        let result = client
            .send("app.work.echo", "payload", Priority::Low, true, None)
            .await;

        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::Rejected(_)))
        ));
    }
}
