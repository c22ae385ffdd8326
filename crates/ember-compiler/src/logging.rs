//! Log subscriber setup.
//!
//! One `fmt` layer filtered per pipeline layer through a `Targets` filter.

use std::io;

use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

use crate::config::{LogConfig, LogFormat, TARGET_BC, TARGET_COMPILER, TARGET_IR};
use crate::error::CompileError;

/// The filter [`init`] installs.
pub fn targets(config: &LogConfig) -> Targets {
    Targets::new()
        .with_default(config.level_for(""))
        .with_target(TARGET_IR, config.level_for(TARGET_IR))
        .with_target(TARGET_BC, config.level_for(TARGET_BC))
        .with_target(TARGET_COMPILER, config.level_for(TARGET_COMPILER))
}

fn format_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .without_time()
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<(), CompileError> {
    tracing_subscriber::registry()
        .with(format_layer(config.format).with_filter(targets(config)))
        .try_init()
        .map_err(|e| CompileError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use tracing::Level;

    #[test]
    fn test_per_layer_override() {
        let cfg = LogConfig {
            global: LogLevel::Warn,
            bc: Some(LogLevel::Trace),
            ..LogConfig::default()
        };
        let t = targets(&cfg);
        assert!(t.would_enable(TARGET_BC, &Level::TRACE));
        assert!(!t.would_enable(TARGET_IR, &Level::INFO));
        assert!(t.would_enable(TARGET_IR, &Level::WARN));
        assert!(!t.would_enable("other", &Level::DEBUG));
    }

    #[test]
    fn test_second_init_fails() {
        let cfg = LogConfig::default();
        let _ = init(&cfg);
        assert!(matches!(init(&cfg), Err(CompileError::Logging(_))));
    }
}
