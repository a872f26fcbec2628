//! Wires configuration, transports and works into a running worker process.

use crate::cache::Cache;
use crate::config::{AppConfig, CustomConfig};
use crate::error::WorkhorseResult;
use crate::error::work::WorkError;
use crate::queue::WorkerTransport;
use crate::queue::client::Client;
use crate::queue::worker::QueueWorker;
use crate::work::Work;
use crate::worker::observer::ExceptionObserver;
use crate::worker::{Dispatcher, IterationHook, Lifecycle, WorkDispatchLoop};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

const WORK_SUFFIX: &str = "Work";

pub struct WorkerApp {
    config: AppConfig,
    client: Client,
    worker_transport: Arc<dyn WorkerTransport>,
    cache: Arc<dyn Cache>,
    observer: Option<Arc<dyn ExceptionObserver>>,
    works: BTreeMap<String, Work>,
}

#[bon::bon]
impl WorkerApp {
    #[builder]
    pub fn new(
        config: AppConfig,
        client: Client,
        worker_transport: Arc<dyn WorkerTransport>,
        cache: Arc<dyn Cache>,
        observer: Option<Arc<dyn ExceptionObserver>>,
    ) -> Self {
        Self {
            config,
            client,
            worker_transport,
            cache,
            observer,
            works: Default::default(),
        }
    }
}

impl WorkerApp {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Make `work` available to [`Self::run`]. Ids must be unique, and the work's app must be the
    /// configured `app.name` so its functions land in this app's namespace.
    pub fn add_work(&mut self, work: Work) -> WorkhorseResult<&mut Self> {
        let id = work.id().to_string();
        if work.app() != self.config.app.name {
            return Err(WorkError::AppMismatch {
                work: id,
                app: work.app().to_string(),
                expected: self.config.app.name.clone(),
            }
            .into());
        }
        if self.works.contains_key(&id) {
            return Err(WorkError::AlreadyRegistered(id).into());
        }
        self.works.insert(id, work);
        Ok(self)
    }

    /// Ids of the registered works.
    pub fn work_ids(&self) -> impl Iterator<Item = &str> {
        self.works.keys().map(String::as_str)
    }

    /// Find a work by name: `billing`, `Billing` and `BillingWork` all name the work `billing`.
    pub fn get_work(&self, name: &str) -> Option<&Work> {
        self.work_id(name).and_then(|id| self.works.get(&id))
    }

    fn work_id(&self, name: &str) -> Option<String> {
        let name = name
            .strip_suffix(WORK_SUFFIX)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(name)
            .to_lowercase();
        self.works.contains_key(&name).then_some(name)
    }

    /// Subscribe the named works with `options` applied, and build the loop that serves them.
    #[instrument(skip_all)]
    pub async fn prepare(
        mut self,
        names: &[String],
        options: &CustomConfig,
        hook: impl IterationHook + 'static,
        cancellation_token: CancellationToken,
    ) -> WorkhorseResult<WorkDispatchLoop> {
        let ids = names
            .iter()
            .map(|name| {
                self.work_id(name)
                    .ok_or_else(|| WorkError::UnknownWork(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut works = ids
            .into_iter()
            .unique()
            .filter_map(|id| self.works.remove(&id))
            .collect_vec();

        let mut worker = QueueWorker::new(self.worker_transport.clone(), &self.config.queue);
        for work in works.iter_mut() {
            work.apply_options(options);
            work.register_all(&mut worker).await?;
        }
        let functions = worker.functions().await.len();
        info!(
            works = %works.iter().map(Work::id).join(", "),
            functions,
            "Worker ready"
        );

        let dispatcher = Dispatcher::builder()
            .works(works)
            .client(self.client.clone())
            .cache(self.cache.clone())
            .cache_config(&self.config.cache)
            .instance_id(self.config.app.instance_id())
            .maybe_observer(self.observer.clone())
            .build();

        Ok(WorkDispatchLoop::new(
            worker,
            dispatcher,
            hook,
            self.config.worker.error_backoff,
            cancellation_token,
        ))
    }

    /// Serve the named works until `cancellation_token` is cancelled or the configured lifetime
    /// runs out.
    pub async fn run(
        self,
        names: &[String],
        options: &CustomConfig,
        cancellation_token: CancellationToken,
    ) -> WorkhorseResult<()> {
        let lifecycle = Lifecycle::new(&self.config.worker, cancellation_token.clone());
        self.run_with_lifecycle(names, options, lifecycle, cancellation_token)
            .await
    }

    /// Like [`Self::run`], stopping according to `lifecycle`. Keep a clone of it (e.g. inside a
    /// task) to hold the worker past its deadline with [`Lifecycle::set_allow_die`].
    pub async fn run_with_lifecycle(
        self,
        names: &[String],
        options: &CustomConfig,
        lifecycle: Lifecycle,
        cancellation_token: CancellationToken,
    ) -> WorkhorseResult<()> {
        let mut work_loop = self
            .prepare(names, options, lifecycle, cancellation_token)
            .await?;
        work_loop.run().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::config::reconnect::Reconnect;
    use crate::error::Error;
    use crate::job::Job;
    use crate::job::payload::{Callback, decode_return};
    use crate::queue::Completion;
    use crate::queue::memory::MemoryQueue;
    use crate::work::{ParamDescriptor, TaskDescriptor, TaskOutcome};
    use crate::worker::LoopControl;
    use rstest::{fixture, rstest};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct Fixture {
        app: WorkerApp,
        queue: MemoryQueue,
        logged: Arc<Mutex<Vec<Value>>>,
    }

    fn echo_work(logged: Arc<Mutex<Vec<Value>>>) -> Work {
        Work::builder("app", "work")
            .task(
                TaskDescriptor::new("taskEcho")
                    .param(ParamDescriptor::required("param1"))
                    .param(ParamDescriptor::required("param2")),
                |_context, args| async move { TaskOutcome::completed(args.into_values()) },
            )
            .task(
                TaskDescriptor::new("taskLog")
                    .param(ParamDescriptor::required("status"))
                    .param(ParamDescriptor::required("first"))
                    .param(ParamDescriptor::required("second"))
                    .param(ParamDescriptor::optional("result", Value::Null)),
                move |_context, args| {
                    let logged = logged.clone();
                    async move {
                        let mut logged = logged.lock().map_err(|err| err.to_string())?;
                        logged.extend(args.into_values());
                        Ok::<_, String>(())
                    }
                },
            )
            .build()
    }

    #[fixture]
    fn echo_app() -> Fixture {
        let config = AppConfig::test(None).unwrap();
        let queue = MemoryQueue::new();
        let logged: Arc<Mutex<Vec<Value>>> = Default::default();
        let mut app = WorkerApp::builder()
            .config(config)
            .client(Client::new(Arc::new(queue.clone()), Reconnect::default()))
            .worker_transport(Arc::new(queue.clone()))
            .cache(Arc::new(MemoryCache::new()))
            .build();
        app.add_work(echo_work(logged.clone())).unwrap();
        Fixture { app, queue, logged }
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

    #[rstest]
    #[case("work")]
    #[case("Work")]
    #[case("WorkWork")]
    #[case("WORK")]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn get_work(echo_app: Fixture, #[case] name: &str) {
        assert_eq!(echo_app.app.get_work(name).map(Work::id), Some("work"));
    }

    #[rstest]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn duplicate_work(mut echo_app: Fixture) {
        let err = echo_app
            .app
            .add_work(echo_work(Default::default()))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Work(WorkError::AlreadyRegistered(id)) if id == "work"
        ));
    }

    #[rstest]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn work_from_other_app(mut echo_app: Fixture) {
        let work = Work::builder("shop", "billing").build();
        let err = echo_app.app.add_work(work).err().unwrap();

        assert!(matches!(
            err,
            Error::Work(WorkError::AppMismatch { work, app, expected })
                if work == "billing" && app == "shop" && expected == "app"
        ));
        assert_eq!(echo_app.app.work_ids().collect_vec(), vec!["work"]);
    }

    #[rstest]
    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn unknown_work(echo_app: Fixture) {
        let result = echo_app
            .app
            .prepare(
                &["billing".to_string()],
                &CustomConfig::new(),
                || LoopControl::Terminate,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(Error::Work(WorkError::UnknownWork(name))) if name == "billing"
        ));
    }

    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn task_holds_worker_past_deadline() {
        let config = AppConfig::test(Some(
            r#"
            environment = "test"

            [app]
            name = "app"
            instance-id = "test-host:1"

            [worker]
            lifetime = 0
            "#,
        ))
        .unwrap();
        let token = CancellationToken::new();
        let lifecycle = Lifecycle::new(&config.worker, token.clone());
        assert!(lifecycle.deadline().is_some());

        let hold = lifecycle.clone();
        let release = lifecycle.clone();
        let work = Work::builder("app", "shift")
            .task(TaskDescriptor::new("taskHold"), move |_context, _args| {
                hold.set_allow_die(false);
                async { TaskOutcome::done() }
            })
            .task(TaskDescriptor::new("taskRelease"), move |_context, _args| {
                release.set_allow_die(true);
                async { TaskOutcome::done() }
            })
            .build();

        let queue = MemoryQueue::new();
        let mut app = WorkerApp::builder()
            .config(config)
            .client(Client::new(Arc::new(queue.clone()), Reconnect::default()))
            .worker_transport(Arc::new(queue.clone()))
            .cache(Arc::new(MemoryCache::new()))
            .build();
        app.add_work(work).unwrap();
        for function in ["app.shift.hold", "app.shift.release"] {
            Job::builder()
                .function(function)
                .build()
                .send(app.client())
                .await
                .unwrap();
        }

        app.run_with_lifecycle(&["shift".to_string()], &CustomConfig::new(), lifecycle, token)
            .await
            .unwrap();

        assert_eq!(queue.completed().unwrap().len(), 2);
    }

    #[rstest]
    #[tokio::test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn echo_with_callback(echo_app: Fixture) {
        let Fixture { app, queue, logged } = echo_app;
        let mut job = Job::builder()
            .function("app.work.echo")
            .params(json!({"param1": "a", "param2": "b"}))
            .callback(Callback::with_args(
                "app.work.log",
                vec![json!("a"), json!("b")],
            ))
            .build();
        let handle = job.send(app.client()).await.unwrap();
        assert!(!handle.is_empty());
        assert_eq!(job.handle(), Some(handle.as_str()));

        let mut work_loop = app
            .prepare(
                &["WorkWork".to_string()],
                &CustomConfig::new(),
                stop_after(2),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            work_loop.worker().functions().await,
            vec!["app.work.echo", "app.work.log"]
        );
        work_loop.run().await;

        let completed = queue.completed().unwrap();
        assert_eq!(completed.len(), 2);
        let (echo, completion) = &completed[0];
        assert_eq!(echo.handle, handle);
        let Completion::Success(result) = completion else {
            panic!("echo failed: {completion:?}");
        };
        assert_eq!(decode_return(result).unwrap(), json!(["a", "b"]));

        let logged = logged.lock().unwrap().clone();
        assert_eq!(logged.len(), 4);
        assert_eq!(logged[0]["status"], json!("done"));
        assert_eq!(logged[0]["jobHandle"], json!(handle));
        assert_eq!(logged[1..], [json!("a"), json!("b"), json!(["a", "b"])]);
    }
}
