use crate::cache::Cache;
use crate::config::CustomConfig;
use crate::job::Job;
use crate::queue::client::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::Span;

/// Everything a task handler can reach while it runs: the job being handled, the queue client
/// (to submit follow-up jobs), the cache, and the options given to its work on the command line.
#[derive(Clone)]
pub struct JobContext {
    job: Arc<Job>,
    client: Client,
    cache: Arc<dyn Cache>,
    options: Arc<CustomConfig>,
    log_prefix: String,
    span: Span,
}

impl JobContext {
    pub(crate) fn new(
        job: Job,
        client: Client,
        cache: Arc<dyn Cache>,
        options: Arc<CustomConfig>,
        log_prefix: String,
        span: Span,
    ) -> Self {
        Self {
            job: Arc::new(job),
            client,
            cache,
            options,
            log_prefix,
            span,
        }
    }

    /// The job as it was when the handler was invoked.
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn options(&self) -> &CustomConfig {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// `[instance] [handle] [item]…`, also recorded on [`Self::span`].
    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    /// The span every log line of this job is emitted in.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Render the prefix attached to a job's log lines: the instance id, then each non-empty item.
/// A list contributes one item per element.
pub fn render_log_prefix<'a>(instance: &str, items: impl IntoIterator<Item = &'a Value>) -> String {
    let mut prefix = format!("[{instance}]");
    for item in items {
        match item {
            Value::Array(list) => list.iter().for_each(|item| push_item(&mut prefix, item)),
            item => push_item(&mut prefix, item),
        }
    }
    prefix
}

fn push_item(prefix: &mut String, item: &Value) {
    let rendered = match item {
        Value::Null | Value::Bool(false) => return,
        Value::String(inner) if inner.is_empty() => return,
        Value::String(inner) => inner.clone(),
        other => other.to_string(),
    };
    prefix.push_str(" [");
    prefix.push_str(&rendered);
    prefix.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(vec![], "[host:1]")]
    #[case(vec![json!("H:1"), json!(null)], "[host:1] [H:1]")]
    #[case(vec![json!("H:1"), json!("order-7")], "[host:1] [H:1] [order-7]")]
    #[case(vec![json!("H:1"), json!(["order", 7, "", null])], "[host:1] [H:1] [order] [7]")]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn log_prefix(#[case] items: Vec<Value>, #[case] expected: &str) {
        assert_eq!(render_log_prefix("host:1", &items), expected);
    }
}
