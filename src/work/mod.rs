//! A [`Work`] groups related task handlers under one id, and knows which queue functions map to
//! which of its tasks.

use crate::config::CustomConfig;
use crate::error::WorkhorseResult;
use crate::error::work::{BindingError, RoutingError};
use crate::job::FailureInfo;
use crate::queue::worker::QueueWorker;
use crate::util::types::simple_type_name;
use crate::work::binder::BoundArgs;
use crate::work::context::JobContext;
use futures::FutureExt;
use futures::future::BoxFuture;
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

pub mod binder;
pub mod context;
pub mod router;

/// A parameter a task declares.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    /// Used when the job does not provide the parameter. `None` makes the parameter required.
    pub default: Option<Value>,
    /// The parameter must receive a list or a map.
    pub collection: bool,
}

impl ParamDescriptor {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            collection: false,
        }
    }

    pub fn optional(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
            collection: false,
        }
    }

    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }
}

/// A task method and its parameters, in call order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub method: String,
    pub params: Vec<ParamDescriptor>,
}

impl TaskDescriptor {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    /// `($amount, [$currency])`: optional parameters are bracketed.
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|param| {
                if param.default.is_some() {
                    format!("[${}]", param.name)
                } else {
                    format!("${}", param.name)
                }
            })
            .join(", ");
        format!("({params})")
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The task finished, optionally with a value for the caller and the callback.
    Completed(Option<Value>),
    /// The task failed. The job is reported as failed and the callback still runs.
    Failed(FailureInfo),
    /// The task decided the job should not run at all. No callback is sent.
    Refused(Option<String>),
}

impl TaskOutcome {
    pub fn done() -> Self {
        TaskOutcome::Completed(None)
    }

    /// Complete with `value`. A value that serializes to `null` counts as no value.
    pub fn completed<T>(value: T) -> Self
    where
        T: Serialize,
    {
        match serde_json::to_value(value) {
            Ok(Value::Null) => TaskOutcome::Completed(None),
            Ok(value) => TaskOutcome::Completed(Some(value)),
            Err(err) => TaskOutcome::failed(&err),
        }
    }

    /// Fail with the type name of `err` as the error kind.
    pub fn failed<E>(err: &E) -> Self
    where
        E: Display,
    {
        TaskOutcome::Failed(FailureInfo::new(simple_type_name::<E>(), err.to_string()))
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        TaskOutcome::Refused(Some(reason.into()))
    }
}

impl<T, E> From<Result<T, E>> for TaskOutcome
where
    T: Serialize,
    E: Display,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => TaskOutcome::completed(value),
            Err(err) => TaskOutcome::failed(&err),
        }
    }
}

type TaskFn = Box<dyn Fn(JobContext, BoundArgs) -> BoxFuture<'static, TaskOutcome> + Send + Sync>;

struct TaskHandler {
    descriptor: TaskDescriptor,
    handler: TaskFn,
}

pub struct Work {
    id: String,
    app: String,
    tasks: BTreeMap<String, TaskHandler>,
    task_map: BTreeMap<String, String>,
    options: Arc<CustomConfig>,
}

impl Work {
    /// Start building the work `id` of application `app`. The id is lowercased.
    pub fn builder(app: impl Into<String>, id: impl Into<String>) -> WorkBuilder {
        WorkBuilder {
            app: app.into(),
            id: id.into().to_lowercase(),
            tasks: BTreeMap::new(),
            options: CustomConfig::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Declared task methods, in name order.
    pub fn methods(&self) -> impl Iterator<Item = &str> + Clone {
        self.tasks.keys().map(String::as_str)
    }

    pub fn descriptor(&self, method: &str) -> Option<&TaskDescriptor> {
        self.tasks.get(method).map(|task| &task.descriptor)
    }

    /// Function name to method name.
    pub fn task_map(&self) -> &BTreeMap<String, String> {
        &self.task_map
    }

    pub fn options(&self) -> &Arc<CustomConfig> {
        &self.options
    }

    /// Merge named options into the work's options; later values win.
    pub fn apply_options(&mut self, options: &CustomConfig) {
        let merged = Arc::make_mut(&mut self.options);
        merged.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Replace the convention-based task map. An empty map is ignored and `false` returned.
    /// Method names are resolved as in [`router::resolve_method`].
    pub fn set_tasks(&mut self, tasks: BTreeMap<String, String>) -> Result<bool, RoutingError> {
        if tasks.is_empty() {
            return Ok(false);
        }
        let task_map = tasks
            .into_iter()
            .map(|(function, method)| {
                let method = router::resolve_method(&function, &method, self.methods())?;
                Ok((function, method))
            })
            .collect::<Result<BTreeMap<_, _>, RoutingError>>()?;
        self.task_map = task_map;
        Ok(true)
    }

    /// The method serving `function`.
    pub fn map_task(&self, function: &str) -> Result<&str, RoutingError> {
        let method = self
            .task_map
            .get(function)
            .ok_or_else(|| RoutingError::UnknownFunction {
                function: function.to_string(),
                work: self.id.clone(),
            })?;
        if !self.tasks.contains_key(method) {
            return Err(RoutingError::NotImplemented {
                work: self.id.clone(),
                method: method.clone(),
                function: function.to_string(),
            });
        }
        Ok(method)
    }

    /// Serve `function` with `method` and subscribe to it. A function previously served by a
    /// different method is unsubscribed first.
    pub async fn register(
        &mut self,
        function: &str,
        method: &str,
        worker: &mut QueueWorker,
    ) -> WorkhorseResult<()> {
        let method = router::resolve_method(function, method, self.methods())?;
        let rebound = self
            .task_map
            .get(function)
            .is_some_and(|previous| *previous != method);
        if rebound {
            self.unregister(function, worker).await?;
        }
        self.task_map.insert(function.to_string(), method.clone());

        worker.add_function(function).await?;

        let signature = self
            .descriptor(&method)
            .map(TaskDescriptor::signature)
            .unwrap_or_default();
        info!(
            work = %self.id,
            "Registered: {function} => {}::{method}{signature}",
            self.id
        );
        Ok(())
    }

    pub async fn unregister(
        &mut self,
        function: &str,
        worker: &mut QueueWorker,
    ) -> WorkhorseResult<()> {
        worker.unregister(function).await?;
        self.task_map.remove(function);
        info!(work = %self.id, "Unregistered {function}");
        Ok(())
    }

    /// Subscribe to every function in the task map.
    pub async fn register_all(&mut self, worker: &mut QueueWorker) -> WorkhorseResult<()> {
        let tasks = self.task_map.clone();
        for (function, method) in tasks {
            self.register(&function, &method, worker).await?;
        }
        Ok(())
    }

    pub(crate) fn bind(&self, method: &str, params: &Value) -> Result<BoundArgs, BindingError> {
        match self.descriptor(method) {
            Some(descriptor) => binder::bind(descriptor, params),
            None => Ok(BoundArgs::default()),
        }
    }

    pub(crate) fn invoke(
        &self,
        method: &str,
        context: JobContext,
        args: BoundArgs,
    ) -> Result<BoxFuture<'static, TaskOutcome>, RoutingError> {
        let task = self
            .tasks
            .get(method)
            .ok_or_else(|| RoutingError::NotImplemented {
                work: self.id.clone(),
                method: method.to_string(),
                function: context.job().function.clone(),
            })?;
        Ok((task.handler)(context, args))
    }
}

pub struct WorkBuilder {
    app: String,
    id: String,
    tasks: BTreeMap<String, TaskHandler>,
    options: CustomConfig,
}

impl WorkBuilder {
    /// Declare a task. The handler receives the job context and the bound arguments, and may
    /// return a [`TaskOutcome`] or anything convertible into one (e.g. a `Result`).
    pub fn task<F, Fut, O>(mut self, descriptor: TaskDescriptor, handler: F) -> Self
    where
        F: Fn(JobContext, BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: Into<TaskOutcome> + 'static,
    {
        let method = descriptor.method.clone();
        let handler: TaskFn = Box::new(move |context, args| {
            handler(context, args)
                .map(Into::<TaskOutcome>::into)
                .boxed()
        });
        let previous = self
            .tasks
            .insert(method.clone(), TaskHandler { descriptor, handler });
        if previous.is_some() {
            warn!(work = %self.id, "Task `{method}` was declared twice; keeping the last one");
        }
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    /// Finish the work. Its task map follows the `task…` naming convention until replaced with
    /// [`Work::set_tasks`].
    pub fn build(self) -> Work {
        let task_map =
            router::default_task_map(&self.app, &self.id, self.tasks.keys().map(String::as_str));
        Work {
            id: self.id,
            app: self.app,
            tasks: self.tasks,
            task_map,
            options: Arc::new(self.options),
        }
    }
}
