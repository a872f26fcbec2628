use crate::config::AppConfig;
use crate::config::tracing::Format;
use crate::error::WorkhorseResult;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub fn init_tracing(app_config: &AppConfig) -> WorkhorseResult<()> {
    let env_filter = init_env_filter(app_config)?;

    let stdout_layer = match app_config.tracing.format {
        Format::None => None,
        Format::Pretty => Some(tracing_subscriber::fmt::layer().pretty().boxed()),
        Format::Compact => Some(tracing_subscriber::fmt::layer().compact().boxed()),
        Format::Json => Some(tracing_subscriber::fmt::layer().json().boxed()),
    };

    tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()?;

    Ok(())
}

fn init_env_filter(app_config: &AppConfig) -> WorkhorseResult<EnvFilter> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::from_str(&app_config.tracing.level)?.into())
        .from_env()?;

    let env_filter = app_config
        .tracing
        .trace_filters
        .iter()
        .try_fold(env_filter, |env_filter, filter| {
            Ok::<_, crate::error::Error>(env_filter.add_directive(filter.parse()?))
        })?;

    Ok(env_filter)
}
