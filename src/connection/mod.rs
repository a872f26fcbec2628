//! Ownership of a single link to a remote service (queue server, database) and the reconnect
//! discipline shared by every layer that talks to one.

use crate::config::reconnect::Reconnect;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, warn};

/// Describes how to open a link to one remote service and which of its failures are worth a
/// reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Name of the service, used in logs.
    fn name(&self) -> &str;

    /// Open a fresh connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Whether `error` means the link is broken and a new connection may succeed.
    fn is_transient(&self, error: &Self::Error) -> bool;

    /// Called with a connection that is about to be dropped after a transient failure.
    async fn release(&self, _connection: &mut Self::Connection) {}
}

/// Owns at most one connection produced by a [`Connector`] and re-establishes it when an
/// operation fails transiently.
pub struct ConnectionManager<C>
where
    C: Connector,
{
    connector: C,
    connection: Option<C::Connection>,
    policy: Reconnect,
}

impl<C> ConnectionManager<C>
where
    C: Connector,
{
    pub fn new(connector: C, policy: Reconnect) -> Self {
        Self {
            connector,
            connection: None,
            policy,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn policy(&self) -> &Reconnect {
        &self.policy
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Open a fresh connection, replacing (and releasing) the current one if any.
    pub async fn connect(&mut self) -> Result<&mut C::Connection, C::Error> {
        self.drop_connection().await;
        let connection = self.connector.connect().await?;
        debug!(service = self.connector.name(), "Connected");
        Ok(self.connection.insert(connection))
    }

    /// Run `op` against the current connection, connecting first if needed.
    ///
    /// A transient failure (from `op` or from connecting) is logged, followed by a pause of
    /// [`Reconnect::backoff`] and a fresh connection, up to [`Reconnect::attempts`] attempts in
    /// total. The last error is returned once the attempts are used up. Any other failure is
    /// returned immediately.
    ///
    /// `op` may run several times, so it should own (or clone) whatever it sends.
    pub async fn with_retry<T, F>(&mut self, mut op: F) -> Result<T, C::Error>
    where
        F: for<'c> FnMut(&'c mut C::Connection) -> BoxFuture<'c, Result<T, C::Error>> + Send,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match self.current().await {
                Ok(connection) => op(connection).await,
                Err(err) => Err(err),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.connector.is_transient(&err) {
                return Err(err);
            }
            if attempt >= attempts {
                warn!(
                    service = self.connector.name(),
                    attempts, "Giving up after {attempts} attempts: {err}"
                );
                return Err(err);
            }

            warn!(
                service = self.connector.name(),
                attempt,
                attempts,
                "Connection failed: {err}. Reconnecting in {:?}",
                self.policy.backoff
            );
            self.drop_connection().await;
            sleep(self.policy.backoff).await;
            attempt += 1;
        }
    }

    /// Run `op` once against the current connection, connecting first if needed. A transient
    /// failure drops the connection so the next call starts with a fresh one.
    pub async fn attempt<T, F>(&mut self, op: F) -> Result<T, C::Error>
    where
        F: for<'c> FnOnce(&'c mut C::Connection) -> BoxFuture<'c, Result<T, C::Error>> + Send,
    {
        let result = match self.current().await {
            Ok(connection) => op(connection).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            if self.connector.is_transient(err) {
                self.drop_connection().await;
            }
        }
        result
    }

    async fn current(&mut self) -> Result<&mut C::Connection, C::Error> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connector.connect().await?,
        };
        Ok(self.connection.insert(connection))
    }

    async fn drop_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            self.connector.release(&mut connection).await;
        }
    }
}

async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::transport::TransportError;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Refuses its first `failing_connects` connection attempts.
    #[derive(Default)]
    struct FlakyConnector {
        connects: AtomicUsize,
        failing_connects: usize,
        releases: AtomicUsize,
    }

    struct FlakyConnection {
        id: usize,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        type Connection = FlakyConnection;
        type Error = TransportError;

        fn name(&self) -> &str {
            "flaky"
        }

        async fn connect(&self) -> Result<Self::Connection, Self::Error> {
            let id = self.connects.fetch_add(1, Ordering::SeqCst);
            if id < self.failing_connects {
                return Err(TransportError::Connection("refused".to_string()));
            }
            Ok(FlakyConnection { id })
        }

        fn is_transient(&self, error: &Self::Error) -> bool {
            error.is_transient()
        }

        async fn release(&self, _connection: &mut Self::Connection) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(failing_connects: usize) -> ConnectionManager<FlakyConnector> {
        ConnectionManager::new(
            FlakyConnector {
                failing_connects,
                ..Default::default()
            },
            Reconnect::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn succeeds_after_transient_failures() {
        let mut manager = manager(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let result = manager
            .with_retry(|connection| {
                let calls = calls.clone();
                async move {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    if call < 3 {
                        Err(TransportError::Connection("reset by peer".to_string()))
                    } else {
                        Ok(format!("result from connection {}", connection.id))
                    }
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(result, "result from connection 3");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 4);
        assert_eq!(manager.connector().releases.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn non_transient_failure_is_not_retried() {
        let mut manager = manager(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let result: Result<(), _> = manager
            .with_retry(|_connection| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TransportError::Rejected("no such function".to_string()))
                }
                .boxed()
            })
            .await;

        assert!(matches!(result, Err(TransportError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn gives_up_after_configured_attempts() {
        let mut manager = manager(0);
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> = manager
            .with_retry(|_connection| {
                let calls = calls.clone();
                async move {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    Err(TransportError::Connection(format!("attempt {call}")))
                }
                .boxed()
            })
            .await;

        match result {
            Err(TransportError::Connection(message)) => assert_eq!(message, "attempt 9"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn failed_connect_counts_as_attempt() {
        let mut manager = manager(2);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = manager
            .with_retry(|connection| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TransportError>(connection.id)
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn single_attempt_drops_broken_connection() {
        let mut manager = manager(0);

        let result: Result<(), _> = manager
            .attempt(|_connection| {
                async move { Err(TransportError::Connection("reset".to_string())) }.boxed()
            })
            .await;
        assert!(result.is_err());
        assert!(!manager.is_connected());

        let id = manager
            .attempt(|connection| async move { Ok::<_, TransportError>(connection.id) }.boxed())
            .await
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn connect_replaces_existing_connection() {
        let mut manager = manager(0);

        assert_eq!(manager.connect().await.unwrap().id, 0);
        assert_eq!(manager.connect().await.unwrap().id, 1);
        assert_eq!(manager.connector().releases.load(Ordering::SeqCst), 1);
        assert!(manager.is_connected());
    }
}
