//! Shared logging bootstrap for kpi-ledger binaries.

use crate::{Error, Result};

use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }

    /// Read `KPI_LEDGER_LOG_FORMAT` (default: text).
    pub fn from_env() -> Result<Self> {
        match std::env::var("KPI_LEDGER_LOG_FORMAT") {
            Ok(raw) => raw.parse(),
            Err(_) => Ok(LogFormat::Text),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!(
                "invalid KPI_LEDGER_LOG_FORMAT '{}'; expected text or json",
                other
            ))),
        }
    }
}

/// Handle for the installed subscriber.
#[derive(Debug)]
pub struct Telemetry {
    component: String,
    level: Level,
    format: LogFormat,
}

impl Telemetry {
    /// Install the global subscriber for `component`. `RUST_LOG`, when set,
    /// overrides `log_level`.
    pub fn init_for_component(component: &str, log_level: &str) -> Result<Self> {
        let level = parse_log_level(log_level)?;
        let format = LogFormat::from_env()?;
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

        let builder = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr);

        let installed = match format {
            LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
            LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        };
        installed.map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;

        info!(
            component = %component,
            log_level = %level,
            log_format = format.as_str(),
            "Telemetry initialized"
        );

        Ok(Self {
            component: component.to_string(),
            level,
            format,
        })
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }
}

fn parse_log_level(raw: &str) -> Result<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(Error::Config(format!(
            "invalid log level '{}'; expected trace, debug, info, warn or error",
            other
        ))),
    }
}
