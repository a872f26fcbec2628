use crate::cache::Cache;
use crate::config::cache::Cache as CacheConfig;
use crate::error::work::RoutingError;
use crate::job::payload::encode_return;
use crate::job::{FailureInfo, Job};
use crate::queue::client::Client;
use crate::queue::{Completion, Delivery};
use crate::work::binder::invocation_line;
use crate::work::context::{JobContext, render_log_prefix};
use crate::work::{TaskOutcome, Work};
use crate::worker::callback::CallbackChainer;
use crate::worker::observer::{ExceptionObserver, LogObserver};
use crate::worker::retry_limiter::RetryLimiter;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Span, error, field, info, info_span, warn};

/// Runs one delivery through routing, the retry gate, argument binding, the handler and the
/// callback, and decides what to report back to the queue server.
pub struct Dispatcher {
    works: BTreeMap<String, Work>,
    routes: BTreeMap<String, String>,
    retry_limiter: RetryLimiter,
    chainer: CallbackChainer,
    client: Client,
    cache: Arc<dyn Cache>,
    observer: Arc<dyn ExceptionObserver>,
    instance_id: String,
}

#[bon::bon]
impl Dispatcher {
    /// The routes are taken from the works' task maps as they are now.
    #[builder]
    pub fn new(
        works: Vec<Work>,
        client: Client,
        cache: Arc<dyn Cache>,
        cache_config: &CacheConfig,
        #[builder(into)] instance_id: String,
        #[builder(default = Arc::new(LogObserver) as Arc<dyn ExceptionObserver>)]
        observer: Arc<dyn ExceptionObserver>,
    ) -> Self {
        let mut routes = BTreeMap::new();
        for work in works.iter() {
            for function in work.task_map().keys() {
                if let Some(previous) = routes.insert(function.clone(), work.id().to_string()) {
                    warn!(
                        function,
                        previous,
                        work = work.id(),
                        "Function is mapped by more than one work; using the last one"
                    );
                }
            }
        }
        Self {
            works: works
                .into_iter()
                .map(|work| (work.id().to_string(), work))
                .collect(),
            routes,
            retry_limiter: RetryLimiter::new(cache.clone(), cache_config),
            chainer: CallbackChainer::new(client.clone()),
            client,
            cache,
            observer,
            instance_id,
        }
    }

    /// Functions this dispatcher can serve.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub async fn dispatch(&self, delivery: &Delivery) -> Completion {
        let mut job = match Job::from_delivery(delivery) {
            Ok(job) => job,
            Err(err) => {
                error!(
                    function = %delivery.function,
                    handle = %delivery.handle,
                    "Unable to decode job: {err}"
                );
                return Completion::Fail;
            }
        };
        let handle = delivery.handle.clone();
        let log_prefix = render_log_prefix(
            &self.instance_id,
            [&Value::String(handle.clone()), &job.log_prefix],
        );
        let span = info_span!(
            "job",
            function = %job.function,
            handle = %handle,
            work = field::Empty,
            prefix = %log_prefix,
        );

        async {
            let started = Instant::now();
            let Some(outcome) = self.execute(&mut job, &log_prefix).await else {
                return Completion::Fail;
            };

            let result = match outcome {
                TaskOutcome::Refused(reason) => {
                    match reason {
                        Some(reason) => info!("Job refused. Reason: {reason}."),
                        None => info!("Job refused."),
                    }
                    return Completion::Success(handle);
                }
                TaskOutcome::Completed(result) => {
                    if let Err(err) = self.retry_limiter.clear(&handle).await {
                        warn!("Unable to clear the retry counter: {err}");
                    }
                    if let Err(err) = job.done() {
                        error!("{err}");
                    }
                    info!(
                        "Finished. Job took: {:.3} seconds.",
                        started.elapsed().as_secs_f64()
                    );
                    result
                }
                TaskOutcome::Failed(failure) => {
                    self.fail(&mut job, failure).await;
                    None
                }
            };

            self.chainer.send(&job, result.as_ref()).await;

            match result {
                None => Completion::Success(handle),
                Some(result) => match encode_return(&result) {
                    Ok(encoded) => Completion::Success(encoded),
                    Err(err) => {
                        error!("Unable to encode the job result: {err}");
                        Completion::Success(handle)
                    }
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Everything between routing and the handler's return. `None` means the retry gate turned
    /// the job away.
    async fn execute(&self, job: &mut Job, log_prefix: &str) -> Option<TaskOutcome> {
        let (work, method) = match self.route(&job.function) {
            Ok(route) => route,
            Err(err) => return Some(TaskOutcome::failed(&err)),
        };
        Span::current().record("work", work.id());

        let handle = job.handle().unwrap_or_default().to_string();
        match self.retry_limiter.admit(&handle).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Job {handle} canceled. Too many retries.");
                return None;
            }
            Err(err) => return Some(TaskOutcome::failed(&err)),
        }

        info!("Received task");
        if let Err(err) = job.start() {
            return Some(TaskOutcome::failed(&err));
        }

        let args = match work.bind(method, &job.params) {
            Ok(args) => args,
            Err(err) => return Some(TaskOutcome::failed(&err)),
        };
        info!("{}", invocation_line(work.id(), method, &args));

        let context = JobContext::new(
            job.clone(),
            self.client.clone(),
            self.cache.clone(),
            work.options().clone(),
            log_prefix.to_string(),
            Span::current(),
        );
        match work.invoke(method, context, args) {
            Ok(task) => Some(task.await),
            Err(err) => Some(TaskOutcome::failed(&err)),
        }
    }

    fn route(&self, function: &str) -> Result<(&Work, &str), RoutingError> {
        let work = self
            .routes
            .get(function)
            .and_then(|id| self.works.get(id))
            .ok_or_else(|| RoutingError::Unbound(function.to_string()))?;
        let method = work.map_task(function)?;
        Ok((work, method))
    }

    async fn fail(&self, job: &mut Job, failure: FailureInfo) {
        if let Err(err) = job.failed(failure.clone()) {
            error!("{err}");
        }
        error!(
            error_kind = %failure.error_kind,
            "Job failed: {}",
            failure.message
        );
        self.observer.on_failure(job, &failure).await;
    }
}
