use config::{FileFormat, FileSourceString};
use serde_derive::{Deserialize, Serialize};
use std::borrow::Cow;
use strum_macros::{EnumString, IntoStaticStr};
use tracing_subscriber::EnvFilter;
use validator::{Validate, ValidationError};

pub fn default_config() -> config::File<FileSourceString, FileFormat> {
    config::File::from_str(include_str!("default.toml"), FileFormat::Toml)
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Tracing {
    /// Default level for spans and events not matched by a filter directive.
    pub level: String,

    pub format: Format,

    /// Extra [`EnvFilter`] directives, e.g. `workhorse::worker=debug` or `tokio=warn`.
    #[serde(default)]
    #[validate(custom(function = "validate_directives"))]
    pub trace_filters: Vec<String>,
}

fn validate_directives(directives: &[String]) -> Result<(), ValidationError> {
    let (rejected, reasons): (Vec<&String>, Vec<String>) = directives
        .iter()
        .filter_map(|directive| match directive.parse::<EnvFilter>() {
            Ok(_) => None,
            Err(err) => Some((directive, err.to_string())),
        })
        .unzip();

    if rejected.is_empty() {
        Ok(())
    } else {
        let mut err = ValidationError::new("trace_filters")
            .with_message(Cow::from(format!("{} invalid directive(s)", rejected.len())));
        err.add_param(Cow::from("directives"), &rejected);
        err.add_param(Cow::from("reasons"), &reasons);
        Err(err)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[non_exhaustive]
pub enum Format {
    None,
    Pretty,
    Compact,
    Json,
}
