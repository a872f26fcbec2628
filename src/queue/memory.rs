//! In-process queue server used to run the engine without external services.

use crate::config::queue::QueueOption;
use crate::error::mutex::MutexError;
use crate::error::transport::TransportError;
use crate::queue::{
    ClientConnection, ClientTransport, Completion, Delivery, Primitive, Priority,
    WorkerConnection, WorkerTransport,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QueuedJob {
    pub handle: String,
    pub function: String,
    pub workload: String,
    pub unique: Option<String>,
    pub priority: Priority,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    queued: VecDeque<QueuedJob>,
    in_progress: BTreeMap<String, QueuedJob>,
    completed: Vec<(QueuedJob, Completion)>,
}

/// A queue server living in this process. Clones share the same queue.
///
/// Only background submissions are supported; there is nobody to wait for on the client side.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Default::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, TransportError> {
        self.state
            .lock()
            .map_err(|err| TransportError::Other(Box::new(MutexError::from(err))))
    }

    /// Jobs waiting to be handed out, in hand-out order.
    pub fn queued(&self) -> Result<Vec<QueuedJob>, TransportError> {
        Ok(self.state()?.queued.iter().cloned().collect())
    }

    /// Jobs reported back by workers, in report order.
    pub fn completed(&self) -> Result<Vec<(QueuedJob, Completion)>, TransportError> {
        Ok(self.state()?.completed.clone())
    }

    fn enqueue(
        &self,
        function: &str,
        workload: &str,
        unique: Option<String>,
        priority: Priority,
    ) -> Result<String, TransportError> {
        let mut state = self.state()?;
        if let Some(unique) = unique.as_deref() {
            let duplicate = state
                .queued
                .iter()
                .chain(state.in_progress.values())
                .find(|job| job.function == function && job.unique.as_deref() == Some(unique));
            if let Some(duplicate) = duplicate {
                return Ok(duplicate.handle.clone());
            }
        }

        state.next_handle += 1;
        let job = QueuedJob {
            handle: format!("H:memory:{}", state.next_handle),
            function: function.to_owned(),
            workload: workload.to_owned(),
            unique,
            priority,
        };
        let handle = job.handle.clone();
        // Higher priorities go ahead of lower ones; equal priorities keep submission order.
        let position = state
            .queued
            .iter()
            .position(|queued| queued.priority < priority)
            .unwrap_or(state.queued.len());
        state.queued.insert(position, job);
        drop(state);

        self.notify.notify_waiters();
        Ok(handle)
    }

    fn take(&self, functions: &BTreeSet<String>) -> Result<Option<QueuedJob>, TransportError> {
        let mut state = self.state()?;
        let Some(position) = state
            .queued
            .iter()
            .position(|job| functions.contains(&job.function))
        else {
            return Ok(None);
        };
        let job = state.queued.remove(position);
        if let Some(job) = &job {
            state.in_progress.insert(job.handle.clone(), job.clone());
        }
        Ok(job)
    }

    fn finish(&self, handle: &str, completion: Completion) -> Result<(), TransportError> {
        let mut state = self.state()?;
        let job = state
            .in_progress
            .remove(handle)
            .ok_or_else(|| TransportError::Rejected(format!("Unknown job handle {handle}")))?;
        state.completed.push((job, completion));
        Ok(())
    }
}

#[async_trait]
impl ClientTransport for MemoryQueue {
    async fn connect(&self) -> Result<Box<dyn ClientConnection>, TransportError> {
        Ok(Box::new(MemoryClientConnection {
            queue: self.clone(),
        }))
    }
}

#[async_trait]
impl WorkerTransport for MemoryQueue {
    async fn connect(
        &self,
        _options: &[QueueOption],
    ) -> Result<Box<dyn WorkerConnection>, TransportError> {
        Ok(Box::new(MemoryWorkerConnection {
            queue: self.clone(),
            functions: Default::default(),
        }))
    }
}

struct MemoryClientConnection {
    queue: MemoryQueue,
}

#[async_trait]
impl ClientConnection for MemoryClientConnection {
    async fn submit(
        &mut self,
        primitive: Primitive,
        function: &str,
        workload: &str,
        unique: Option<String>,
    ) -> Result<String, TransportError> {
        if !primitive.is_background() {
            return Err(TransportError::Unsupported(primitive.to_string()));
        }
        self.queue
            .enqueue(function, workload, unique, primitive.priority())
    }
}

struct MemoryWorkerConnection {
    queue: MemoryQueue,
    functions: BTreeSet<String>,
}

impl MemoryWorkerConnection {
    fn delivery(job: QueuedJob) -> Delivery {
        Delivery {
            handle: job.handle,
            function: job.function,
            unique: job.unique,
            workload: job.workload,
        }
    }
}

#[async_trait]
impl WorkerConnection for MemoryWorkerConnection {
    async fn add_function(&mut self, function: &str) -> Result<(), TransportError> {
        self.functions.insert(function.to_owned());
        Ok(())
    }

    async fn unregister(&mut self, function: &str) -> Result<(), TransportError> {
        self.functions.remove(function);
        Ok(())
    }

    async fn grab(&mut self, timeout: Duration) -> Result<Option<Delivery>, TransportError> {
        let notified = self.queue.notify.notified();
        if let Some(job) = self.queue.take(&self.functions)? {
            return Ok(Some(Self::delivery(job)));
        }
        if tokio::time::timeout(timeout, notified).await.is_err() {
            return Ok(None);
        }
        Ok(self.queue.take(&self.functions)?.map(Self::delivery))
    }

    async fn complete(
        &mut self,
        handle: &str,
        completion: Completion,
    ) -> Result<(), TransportError> {
        self.queue.finish(handle, completion)
    }
}
