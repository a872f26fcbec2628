use crate::config::{ENV_VAR_PREFIX, ENV_VAR_SEPARATOR};
use crate::error::WorkhorseResult;
use crate::error::config::ConfigError;
#[cfg(feature = "cli")]
use clap::ValueEnum;
#[cfg(feature = "cli")]
use clap::builder::PossibleValue;
use const_format::concatcp;
use serde_derive::{Deserialize, Serialize};
use std::env;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The deployment environment; selects which config layer is applied on top of `default`.
///
/// Names other than the three well-known ones are kept as [`Environment::Custom`], so a
/// `config/staging.toml` works without code changes.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum Environment {
    Development,
    Test,
    Production,
    #[serde(untagged)]
    Custom(String),
}

pub(crate) const ENVIRONMENT_ENV_VAR_NAME: &str = "ENVIRONMENT";

const ENVIRONMENT_ENV_VAR: &str =
    concatcp!(ENV_VAR_PREFIX, ENV_VAR_SEPARATOR, ENVIRONMENT_ENV_VAR_NAME);

const ALIASES: &[(&str, Environment)] = &[
    ("development", Environment::Development),
    ("dev", Environment::Development),
    ("test", Environment::Test),
    ("production", Environment::Production),
    ("prod", Environment::Production),
];

impl Environment {
    /// Reads the environment from `WORKHORSE__ENVIRONMENT`.
    // Tracing isn't initialized yet, hence `println`.
    #[allow(clippy::disallowed_macros)]
    pub fn new() -> WorkhorseResult<Self> {
        let raw = env::var(ENVIRONMENT_ENV_VAR).map_err(|_| {
            ConfigError::Environment(format!("`{ENVIRONMENT_ENV_VAR}` is not set"))
        })?;
        let environment = raw.parse::<Environment>().map_err(ConfigError::Environment)?;
        println!("Environment {environment} selected by `{ENVIRONMENT_ENV_VAR}`");
        Ok(environment)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
            Environment::Custom(name) => name,
        }
    }

    fn resolve(input: &str, ignore_case: bool) -> Self {
        ALIASES
            .iter()
            .find(|(alias, _)| {
                if ignore_case {
                    alias.eq_ignore_ascii_case(input)
                } else {
                    *alias == input
                }
            })
            .map(|(_, environment)| environment.clone())
            .unwrap_or_else(|| Environment::Custom(input.to_string()))
    }
}

// Manual impl; the derive can't express the catch-all `Custom` variant.
#[cfg(feature = "cli")]
impl ValueEnum for Environment {
    fn value_variants<'a>() -> &'a [Self] {
        const VARIANTS: &[Environment] = &[
            Environment::Development,
            Environment::Test,
            Environment::Production,
            Environment::Custom(String::new()),
        ];
        VARIANTS
    }

    fn from_str(input: &str, ignore_case: bool) -> Result<Self, String> {
        Ok(Self::resolve(input, ignore_case))
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        let value = match self {
            Environment::Development => PossibleValue::new("development").alias("dev"),
            Environment::Test => PossibleValue::new("test"),
            Environment::Production => PossibleValue::new("production").alias("prod"),
            Environment::Custom(_) => {
                PossibleValue::new("<custom>").help("Any other name selects a custom layer")
            }
        };
        Some(value)
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Environment name is empty".to_string());
        }
        Ok(Self::resolve(s, true))
    }
}
