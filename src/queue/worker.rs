use crate::config::queue::{Queue, QueueOption};
use crate::connection::{ConnectionManager, Connector};
use crate::error::WorkhorseResult;
use crate::error::transport::TransportError;
use crate::queue::{Completion, Delivery, WorkerConnection, WorkerTransport};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Opens worker connections and re-subscribes every function registered so far, so a reconnect
/// does not silently drop subscriptions.
pub struct WorkerConnector {
    transport: Arc<dyn WorkerTransport>,
    options: Vec<QueueOption>,
    functions: Arc<Mutex<BTreeSet<String>>>,
}

#[async_trait]
impl Connector for WorkerConnector {
    type Connection = Box<dyn WorkerConnection>;
    type Error = TransportError;

    fn name(&self) -> &str {
        "queue worker"
    }

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let mut connection = self.transport.connect(&self.options).await?;
        for function in self.functions.lock().await.iter() {
            connection.add_function(function).await?;
        }
        Ok(connection)
    }

    fn is_transient(&self, error: &Self::Error) -> bool {
        error.is_transient()
    }
}

/// The worker side of the queue: function subscriptions, fetching deliveries and reporting
/// their completion.
pub struct QueueWorker {
    manager: ConnectionManager<WorkerConnector>,
    functions: Arc<Mutex<BTreeSet<String>>>,
    timeout: Duration,
}

impl QueueWorker {
    pub fn new(transport: Arc<dyn WorkerTransport>, config: &Queue) -> Self {
        let functions: Arc<Mutex<BTreeSet<String>>> = Default::default();
        let connector = WorkerConnector {
            transport,
            options: config.options.clone(),
            functions: functions.clone(),
        };
        Self {
            manager: ConnectionManager::new(connector, config.reconnect.clone()),
            functions,
            timeout: config.timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Functions currently subscribed, in name order.
    pub async fn functions(&self) -> Vec<String> {
        self.functions.lock().await.iter().cloned().collect()
    }

    /// Subscribe to `function`. Retried on transient failures.
    pub async fn add_function(&mut self, function: &str) -> WorkhorseResult<()> {
        let name = function.to_owned();
        self.manager
            .with_retry(|connection| {
                let name = name.clone();
                async move { connection.add_function(&name).await }.boxed()
            })
            .await?;
        self.functions.lock().await.insert(name);
        debug!(function, "Subscribed");
        Ok(())
    }

    /// Stop receiving jobs for `function`. Retried on transient failures.
    pub async fn unregister(&mut self, function: &str) -> WorkhorseResult<()> {
        let name = function.to_owned();
        self.manager
            .with_retry(|connection| {
                let name = name.clone();
                async move { connection.unregister(&name).await }.boxed()
            })
            .await?;
        self.functions.lock().await.remove(&name);
        debug!(function, "Unsubscribed");
        Ok(())
    }

    /// Wait up to the configured timeout for a delivery. Not retried: a failure surfaces to the
    /// caller and the next call reconnects.
    pub async fn grab(&mut self) -> WorkhorseResult<Option<Delivery>> {
        let timeout = self.timeout;
        let delivery = self
            .manager
            .attempt(|connection| async move { connection.grab(timeout).await }.boxed())
            .await?;
        Ok(delivery)
    }

    /// Report the outcome of a delivery. Handles are only meaningful on the connection that
    /// produced them, so this is not retried either.
    pub async fn complete(&mut self, handle: &str, completion: Completion) -> WorkhorseResult<()> {
        let handle = handle.to_owned();
        self.manager
            .attempt(|connection| {
                async move { connection.complete(&handle, completion).await }.boxed()
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::Error;
    use crate::queue::{MockWorkerConnection, MockWorkerTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> Queue {
        AppConfig::test(None).unwrap().queue
    }

    #[tokio::test(start_paused = true)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn reconnect_resubscribes_functions() {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let mut transport = MockWorkerTransport::new();
        transport
            .expect_connect()
            .withf(|options| options.to_vec() == vec![QueueOption::GrabUniq])
            .times(2)
            .returning(move |_| {
                let mut connection = MockWorkerConnection::new();
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => {
                        connection
                            .expect_add_function()
                            .times(1)
                            .returning(|_| Ok(()));
                        connection
                            .expect_grab()
                            .times(1)
                            .returning(|_| Err(TransportError::Connection("reset".to_string())));
                    }
                    _ => {
                        connection
                            .expect_add_function()
                            .withf(|function| function == "app.work.echo")
                            .times(1)
                            .returning(|_| Ok(()));
                        connection.expect_grab().times(1).returning(|_| Ok(None));
                    }
                }
                Ok(Box::new(connection) as Box<dyn WorkerConnection>)
            });

        let mut worker = QueueWorker::new(Arc::new(transport), &config());
        worker.add_function("app.work.echo").await.unwrap();

        assert!(matches!(
            worker.grab().await,
            Err(Error::Transport(TransportError::Connection(_)))
        ));
        assert_eq!(worker.grab().await.unwrap(), None);
        assert_eq!(worker.functions().await, vec!["app.work.echo".to_string()]);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn unregister_forgets_function() {
        let mut transport = MockWorkerTransport::new();
        transport.expect_connect().times(1).returning(|_| {
            let mut connection = MockWorkerConnection::new();
            connection.expect_add_function().returning(|_| Ok(()));
            connection
                .expect_unregister()
                .withf(|function| function == "app.work.a")
                .times(1)
                .returning(|_| Ok(()));
            Ok(Box::new(connection) as Box<dyn WorkerConnection>)
        });

        let mut worker = QueueWorker::new(Arc::new(transport), &config());
        worker.add_function("app.work.a").await.unwrap();
        worker.add_function("app.work.b").await.unwrap();
        worker.unregister("app.work.a").await.unwrap();

        assert_eq!(worker.functions().await, vec!["app.work.b".to_string()]);
    }

    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn complete_reports_to_connection() {
        let mut transport = MockWorkerTransport::new();
        transport.expect_connect().times(1).returning(|_| {
            let mut connection = MockWorkerConnection::new();
            connection
                .expect_complete()
                .withf(|handle, completion| handle == "H:1" && *completion == Completion::Fail)
                .times(1)
                .returning(|_, _| Ok(()));
            Ok(Box::new(connection) as Box<dyn WorkerConnection>)
        });

        let mut worker = QueueWorker::new(Arc::new(transport), &config());
        worker.complete("H:1", Completion::Fail).await.unwrap();
    }
}
