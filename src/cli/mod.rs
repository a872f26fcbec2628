//! The `workhorse` command line: `worker` serves works, `status` queries the queue server.

use crate::app::WorkerApp;
use crate::config::environment::Environment;
use crate::config::{AppConfig, CustomConfig};
use crate::error::WorkhorseResult;
use crate::error::cli::CliError;
use crate::queue::admin::{ServerAdmin, format_status};
use crate::tracing::init_tracing;
use crate::worker::lifecycle::cancel_on_signal;
use clap::{Args, Parser, Subcommand};
use convert_case::{Case, Casing};
use serde_json::Value;
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Workhorse: serve queue functions with the works registered by this application.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct WorkhorseCli {
    /// Specify the environment to use to run the application. This overrides the corresponding
    /// environment variable if it's set.
    #[clap(short, long, global = true)]
    pub environment: Option<Environment>,

    /// Directory containing the `config/` files. Defaults to the current directory.
    #[clap(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: WorkhorseCommand,
}

#[derive(Debug, Subcommand)]
pub enum WorkhorseCommand {
    /// Run a worker serving the given works.
    Worker(WorkerArgs),
    /// Print the function status table of the first configured queue server.
    Status,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Work names, mixed with `--flag` / `--flag=value` options handed to every work.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// The works to serve and the options to hand them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkerRequest {
    pub works: Vec<String>,
    pub options: CustomConfig,
}

/// Split raw worker arguments into work names and options. Option names fold to camelCase, a
/// bare flag is `true`, and a repeated option collects its values into a list.
pub fn resolve_request(args: &[String]) -> Result<WorkerRequest, CliError> {
    let mut request = WorkerRequest::default();
    for arg in args {
        let Some(option) = arg.strip_prefix("--") else {
            request.works.push(arg.clone());
            continue;
        };
        let (name, value) = match option.split_once('=') {
            Some((name, value)) => (name, Value::String(value.to_string())),
            None => (option, Value::Bool(true)),
        };
        let name = name.to_case(Case::Camel);
        let value = match request.options.remove(&name) {
            None => value,
            Some(Value::Array(mut values)) => {
                values.push(value);
                Value::Array(values)
            }
            Some(previous) => Value::Array(vec![previous, value]),
        };
        request.options.insert(name, value);
    }
    if request.works.is_empty() {
        return Err(CliError::NoWorks);
    }
    Ok(request)
}

/// Parse the process arguments and run the selected command. `build` turns the loaded config into
/// the application, with its transports and works.
pub async fn run<F, Fut>(build: F) -> WorkhorseResult<()>
where
    F: FnOnce(AppConfig) -> Fut,
    Fut: Future<Output = WorkhorseResult<WorkerApp>>,
{
    run_with_args(std::env::args_os(), build).await
}

pub async fn run_with_args<I, T, F, Fut>(args: I, build: F) -> WorkhorseResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnOnce(AppConfig) -> Fut,
    Fut: Future<Output = WorkhorseResult<WorkerApp>>,
{
    let cli = WorkhorseCli::try_parse_from(args)?;
    let config = AppConfig::new(cli.environment.clone(), cli.config_dir.clone())?;
    init_tracing(&config)?;
    config.validate(true)?;

    match cli.command {
        WorkhorseCommand::Worker(args) => {
            let request = resolve_request(&args.args)?;
            let app = build(config).await?;
            let cancellation_token = CancellationToken::new();
            tokio::spawn(cancel_on_signal(cancellation_token.clone()));
            app.run(&request.works, &request.options, cancellation_token)
                .await?;
        }
        WorkhorseCommand::Status => {
            let address = config.queue.servers.first().cloned().unwrap_or_default();
            let mut admin =
                ServerAdmin::new(address, config.queue.timeout, config.queue.reconnect.clone());
            let status = admin.status().await?;
            info!("{}", format_status(&status));
        }
    }
    Ok(())
}
