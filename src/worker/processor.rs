use crate::queue::worker::QueueWorker;
use crate::worker::dispatch::Dispatcher;
use std::time::Duration;
use strum_macros::{Display, IntoStaticStr};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum LoopState {
    Idle,
    Fetching,
    Executing,
    /// Waiting out the backoff after a failed fetch.
    Error,
    /// Absorbing: the loop does not fetch again.
    Terminating,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LoopControl {
    Continue,
    Terminate,
}

/// Consulted after every iteration of the [`WorkDispatchLoop`].
pub trait IterationHook: Send {
    fn after_iteration(&mut self) -> LoopControl;
}

impl<F> IterationHook for F
where
    F: FnMut() -> LoopControl + Send,
{
    fn after_iteration(&mut self) -> LoopControl {
        self()
    }
}

/// Fetches one delivery at a time and runs it to completion before fetching the next.
pub struct WorkDispatchLoop {
    worker: QueueWorker,
    dispatcher: Dispatcher,
    hook: Box<dyn IterationHook>,
    state: LoopState,
    error_backoff: Duration,
    cancellation_token: CancellationToken,
}

impl WorkDispatchLoop {
    pub fn new(
        worker: QueueWorker,
        dispatcher: Dispatcher,
        hook: impl IterationHook + 'static,
        error_backoff: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            worker,
            dispatcher,
            hook: Box::new(hook),
            state: LoopState::Idle,
            error_backoff,
            cancellation_token,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn worker(&self) -> &QueueWorker {
        &self.worker
    }

    /// Iterate until the hook asks to terminate.
    pub async fn run(&mut self) {
        while self.state != LoopState::Terminating {
            self.iterate().await;
            if self.hook.after_iteration() == LoopControl::Terminate {
                self.state = LoopState::Terminating;
            }
        }
        info!("Exiting work loop");
    }

    /// Fetch and handle at most one delivery. Fetch failures are logged and followed by the
    /// error backoff; they never end the loop.
    pub async fn iterate(&mut self) {
        if self.state == LoopState::Terminating {
            return;
        }

        self.state = LoopState::Fetching;
        match self.worker.grab().await {
            Ok(None) => {
                debug!("No job available");
            }
            Ok(Some(delivery)) => {
                self.state = LoopState::Executing;
                let completion = self.dispatcher.dispatch(&delivery).await;
                if let Err(err) = self.worker.complete(&delivery.handle, completion).await {
                    error!(
                        handle = %delivery.handle,
                        "Unable to report job completion: {err}"
                    );
                }
            }
            Err(err) => {
                self.state = LoopState::Error;
                error!("Worker failed: {err}");
                info!("Waiting...");
                tokio::select! {
                    // `biased` ensures that the cancellation token is polled first
                    biased;

                    _ = self.cancellation_token.cancelled() => {},
                    _ = sleep(self.error_backoff) => {},
                }
            }
        }
        self.state = LoopState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::config::AppConfig;
    use crate::config::reconnect::Reconnect;
    use crate::error::transport::TransportError;
    use crate::queue::client::Client;
    use crate::queue::memory::MemoryQueue;
    use crate::queue::{MockWorkerConnection, MockWorkerTransport, WorkerConnection};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn dispatcher(config: &AppConfig) -> Dispatcher {
        Dispatcher::builder()
            .works(Vec::new())
            .client(Client::new(
                Arc::new(MemoryQueue::new()),
                Reconnect::default(),
            ))
            .cache(Arc::new(MemoryCache::new()))
            .cache_config(&config.cache)
            .instance_id("test-host:1")
            .build()
    }

    fn broken_transport(grabs: Arc<AtomicUsize>) -> MockWorkerTransport {
        let mut transport = MockWorkerTransport::default();
        transport.expect_connect().returning(move |_| {
            let grabs = grabs.clone();
            let mut connection = MockWorkerConnection::default();
            connection.expect_grab().returning(move |_| {
                grabs.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Connection("reset by peer".to_string()))
            });
            Ok(Box::new(connection) as Box<dyn WorkerConnection>)
        });
        transport
    }

    fn stop_after(iterations: usize) -> impl FnMut() -> LoopControl + Send {
        let mut count = 0;
        move || {
            count += 1;
            if count >= iterations {
                LoopControl::Terminate
            } else {
                LoopControl::Continue
            }
        }
    }

    #[tokio::test(start_paused = true)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn fetch_errors_back_off_and_continue() {
        let config = AppConfig::test(None).unwrap();
        let grabs = Arc::new(AtomicUsize::new(0));
        let worker = QueueWorker::new(Arc::new(broken_transport(grabs.clone())), &config.queue);
        let mut work_loop = WorkDispatchLoop::new(
            worker,
            dispatcher(&config),
            stop_after(3),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        let start = Instant::now();

        work_loop.run().await;

        assert_eq!(grabs.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert_eq!(work_loop.state(), LoopState::Terminating);
    }

    #[tokio::test(start_paused = true)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn cancellation_cuts_the_backoff_short() {
        let config = AppConfig::test(None).unwrap();
        let grabs = Arc::new(AtomicUsize::new(0));
        let worker = QueueWorker::new(Arc::new(broken_transport(grabs.clone())), &config.queue);
        let token = CancellationToken::new();
        token.cancel();
        let mut work_loop = WorkDispatchLoop::new(
            worker,
            dispatcher(&config),
            stop_after(1),
            Duration::from_secs(5),
            token,
        );
        let start = Instant::now();

        work_loop.run().await;

        assert_eq!(grabs.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn no_fetch_after_terminating() {
        let config = AppConfig::test(None).unwrap();
        let mut transport = MockWorkerTransport::default();
        transport.expect_connect().times(1).returning(|_| {
            let mut connection = MockWorkerConnection::default();
            connection.expect_grab().times(1).returning(|_| Ok(None));
            Ok(Box::new(connection) as Box<dyn WorkerConnection>)
        });
        let worker = QueueWorker::new(Arc::new(transport), &config.queue);
        let mut work_loop = WorkDispatchLoop::new(
            worker,
            dispatcher(&config),
            || LoopControl::Terminate,
            Duration::from_secs(5),
            CancellationToken::new(),
        );

        work_loop.run().await;
        work_loop.iterate().await;
        work_loop.run().await;

        assert_eq!(work_loop.state(), LoopState::Terminating);
    }
}
