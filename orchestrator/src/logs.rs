//! Logging configuration
//!
//! `RUST_LOG` takes precedence when set; otherwise the configured level
//! becomes the global filter directive. Initialization is one-shot per
//! process.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::OrchestratorError;

/// Verbosity of the orchestrator's tracing output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Filter directive form, as `EnvFilter` parses it
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(OrchestratorError::ConfigError(format!(
                "unknown log level '{other}'"
            ))),
        }
    }
}

/// How tracing output is emitted
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub level: LogLevel,

    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

/// Install the process-wide tracing subscriber
pub fn init_logging(options: &LogOptions) -> Result<(), OrchestratorError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.level.as_directive()));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if options.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| OrchestratorError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_accepts_known_levels() {
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("WARNING").unwrap(), LogLevel::Warn);
        assert!(matches!(
            LogLevel::from_str("verbose"),
            Err(OrchestratorError::ConfigError(_))
        ));
    }

    #[test]
    fn test_directive_matches_level() {
        assert_eq!(LogLevel::default().as_directive(), "info");
        assert_eq!(LogLevel::Error.as_directive(), "error");
        assert_eq!(LogLevel::Trace.as_level(), Level::TRACE);
    }

    #[test]
    fn test_second_init_is_rejected() {
        let options = LogOptions::default();

        let _ = init_logging(&options);
        let err = init_logging(&options).unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigError(_)));
    }
}
