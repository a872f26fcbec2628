use crate::config::cache::Cache;
use crate::config::database::Database;
use crate::config::environment::{ENVIRONMENT_ENV_VAR_NAME, Environment};
use crate::config::queue::Queue;
use crate::config::tracing::Tracing;
use crate::config::worker::Worker;
use crate::error::WorkhorseResult;
use ::tracing::warn;
use config::builder::DefaultState;
use config::{Case, Config, ConfigBuilder, FileFormat};
use dotenvy::dotenv;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub mod cache;
pub mod database;
pub mod environment;
pub mod queue;
pub mod reconnect;
pub mod tracing;
pub mod worker;

pub type CustomConfig = BTreeMap<String, Value>;

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct AppConfig {
    pub environment: Environment,
    #[validate(nested)]
    pub app: App,
    #[validate(nested)]
    pub tracing: Tracing,
    #[validate(nested)]
    pub queue: Queue,
    #[validate(nested)]
    pub cache: Cache,
    #[validate(nested)]
    pub worker: Worker,
    #[serde(default)]
    #[validate(nested)]
    pub database: Database,
    /// Allows providing custom config values. Any configs that aren't pre-defined above
    /// will be collected here.
    ///
    /// # Examples
    ///
    /// ```toml
    /// [billing]
    /// currency = "EUR"
    /// ```
    ///
    /// This will be parsed as:
    /// ```raw
    /// AppConfig#custom: {
    ///     "billing": {
    ///         "currency": "EUR",
    ///     }
    /// }
    /// ```
    #[serde(flatten, default)]
    pub custom: CustomConfig,
}

pub const ENV_VAR_PREFIX: &str = "WORKHORSE";
pub const ENV_VAR_SEPARATOR: &str = "__";

const DEFAULT_CONFIG_DIR: &str = "config/";
const BASE_LAYER: &str = "default";

impl AppConfig {
    /// Loads the config in layers, later layers overriding earlier ones:
    ///
    /// 1. The embedded defaults
    /// 2. `{config_dir}/default.toml`, then every `.toml` under `{config_dir}/default/`
    /// 3. `{config_dir}/{environment}.toml`, then every `.toml` under `{config_dir}/{environment}/`
    /// 4. `WORKHORSE__*` env vars (nested keys separated by `__`)
    ///
    /// The environment comes from `environment` if given, otherwise from
    /// `WORKHORSE__ENVIRONMENT`. A `.env` file is read first if one exists.
    // Tracing isn't initialized yet, hence `println`.
    #[allow(clippy::disallowed_macros)]
    pub fn new(
        environment: Option<Environment>,
        config_dir: Option<PathBuf>,
    ) -> WorkhorseResult<Self> {
        dotenv().ok();

        let environment = match environment {
            Some(environment) => {
                println!("Environment {environment} selected on the command line");
                environment
            }
            None => Environment::new()?,
        };

        let dir = config_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));
        let dir = dir.canonicalize().unwrap_or(dir);
        println!("Reading config files from {}", dir.display());

        let mut files = layer_files(&dir, BASE_LAYER)?;
        files.extend(layer_files(&dir, &environment.to_string())?);

        let env_vars = config::Environment::default()
            .prefix(ENV_VAR_PREFIX)
            .separator(ENV_VAR_SEPARATOR)
            .convert_case(Case::Kebab);

        let loaded = files
            .into_iter()
            .fold(Self::embedded_defaults(), |builder, file| {
                builder.add_source(config::File::from(file))
            })
            .add_source(env_vars)
            .set_override(ENVIRONMENT_ENV_VAR_NAME, environment.to_string())?
            .build()?
            .try_deserialize::<AppConfig>()?;

        Ok(loaded)
    }

    /// Builds a config from the embedded defaults plus `overrides` (TOML), or a minimal
    /// test config if `overrides` is `None`.
    #[cfg(any(test, feature = "testing"))]
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn test(overrides: Option<&str>) -> WorkhorseResult<Self> {
        const TEST_CONFIG: &str = r#"
            environment = "test"

            [app]
            name = "app"
            instance-id = "test-host:1"

            [tracing]
            level = "debug"

            [queue]
            servers = ["127.0.0.1:4730"]
        "#;

        let loaded = Self::embedded_defaults()
            .add_source(config::File::from_str(
                overrides.unwrap_or(TEST_CONFIG),
                FileFormat::Toml,
            ))
            .build()?
            .try_deserialize::<AppConfig>()?;
        Ok(loaded)
    }

    fn embedded_defaults() -> ConfigBuilder<DefaultState> {
        Config::builder()
            .add_source(crate::config::tracing::default_config())
            .add_source(config::File::from_str(
                include_str!("default.toml"),
                FileFormat::Toml,
            ))
    }

    /// Runs the field validators. With `exit_on_error` a failure is returned as an error,
    /// otherwise it is only logged.
    pub fn validate(&self, exit_on_error: bool) -> WorkhorseResult<()> {
        match Validate::validate(self) {
            Err(err) if exit_on_error => Err(err.into()),
            Err(err) => {
                warn!(%err, "Config failed validation");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

/// The files making up one named layer: `{dir}/{name}.toml` followed by the `.toml` files
/// found anywhere under `{dir}/{name}/`, in directory-walk order. Missing paths contribute
/// nothing.
fn layer_files(dir: &Path, name: &str) -> WorkhorseResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let single = dir.join(format!("{name}.toml"));
    if single.is_file() {
        files.push(single);
    }
    let nested = dir.join(name);
    if nested.is_dir() {
        collect_toml(&nested, &mut files)?;
    }
    Ok(files)
}

fn collect_toml(dir: &Path, files: &mut Vec<PathBuf>) -> WorkhorseResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_toml(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct App {
    /// First segment of every function name this app registers (`<name>.<work>.<task>`).
    /// [`WorkerApp::add_work`](crate::app::WorkerApp::add_work) rejects works built for another app.
    #[validate(length(min = 1))]
    pub name: String,

    /// Identifies this process in log prefixes. Defaults to `<hostname>:<pid>`.
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl App {
    pub fn instance_id(&self) -> String {
        self.instance_id.clone().unwrap_or_else(|| {
            format!(
                "{}:{}",
                gethostname::gethostname().to_string_lossy(),
                std::process::id()
            )
        })
    }
}
