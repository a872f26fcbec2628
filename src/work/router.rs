//! Mapping between queue function names (`<app>.<work>.<task>`) and the task methods a
//! [`Work`][crate::work::Work] declares.

use crate::error::work::RoutingError;
use std::collections::BTreeMap;

const TASK_PREFIX: &str = "task";
const TASKS: &str = "tasks";

/// Whether a method follows the `task…` naming convention and should be discovered.
pub fn is_task_method(method: &str) -> bool {
    !method.eq_ignore_ascii_case(TASKS) && strip_task_prefix(method).is_some()
}

fn strip_task_prefix(method: &str) -> Option<&str> {
    let prefix = method.get(..TASK_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(TASK_PREFIX) {
        return None;
    }
    let rest = &method[TASK_PREFIX.len()..];
    Some(rest.strip_prefix('_').unwrap_or(rest))
}

/// `taskCharge` in work `billing` of app `app` is served as `app.billing.charge`.
pub fn format_function_name(app: &str, work_id: &str, method: &str) -> String {
    let task = strip_task_prefix(method).unwrap_or(method);
    format!("{app}.{work_id}.{task}").to_lowercase()
}

/// The convention-based task map: every `task…` method, keyed by its function name.
pub fn default_task_map<'a>(
    app: &str,
    work_id: &str,
    methods: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, String> {
    methods
        .into_iter()
        .filter(|method| is_task_method(method))
        .map(|method| {
            (
                format_function_name(app, work_id, method),
                method.to_string(),
            )
        })
        .collect()
}

/// Find the declared method `function` should run. Accepts the exact method name, or a short
/// name that becomes a declared method once prefixed with `task` / `task_` (ignoring case).
pub fn resolve_method<'a>(
    function: &str,
    method: &str,
    declared: impl IntoIterator<Item = &'a str> + Clone,
) -> Result<String, RoutingError> {
    if let Some(exact) = declared.clone().into_iter().find(|name| *name == method) {
        return Ok(exact.to_string());
    }
    let candidates = [
        method.to_string(),
        format!("{TASK_PREFIX}{method}"),
        format!("{TASK_PREFIX}_{method}"),
    ];
    candidates
        .iter()
        .find_map(|candidate| {
            declared
                .clone()
                .into_iter()
                .find(|name| name.eq_ignore_ascii_case(candidate))
        })
        .map(str::to_string)
        .ok_or_else(|| RoutingError::UndefinedMethod {
            function: function.to_string(),
            method: method.to_string(),
        })
}
