//! Subscriber setup for `catuid` and `catui-connect`.
//!
//! Both binaries log to stderr: `catui-connect` owns stdout for bridged
//! application data. `RUST_LOG` always wins over the configured level.
//!
//! ```ignore
//! use catui_core::tracing::{init_tracing, LogFormat, TracingConfig};
//!
//! init_tracing(TracingConfig::daemon().with_format(LogFormat::Json))?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Errors from [`init_tracing`].
#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber is already installed.
    #[error("failed to set global tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),

    /// The filter directive did not parse.
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Line format written to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One human readable line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// What the subscriber prints and at which level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for `catui*` targets when `RUST_LOG` is unset.
    pub level: Level,
    /// Line format.
    pub format: LogFormat,
    /// Prefix lines with a timestamp.
    pub timestamps: bool,
    /// Show the emitting module.
    pub targets: bool,
}

impl TracingConfig {
    /// `catui-connect` default: warnings only, bare lines.
    pub fn cli() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            timestamps: false,
            targets: false,
        }
    }

    /// `catui-connect --debug`.
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            targets: true,
            ..Self::cli()
        }
    }

    /// `catuid`: info level with timestamps and targets.
    pub fn daemon() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            timestamps: true,
            targets: true,
        }
    }

    /// Builder: set the default level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Builder: set the line format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(default_directive(self.level))?),
        }
    }
}

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(level: Level) -> String {
    format!("catui={}", level.to_string().to_ascii_lowercase())
}

/// Installs the global subscriber. Call once, early in `main`.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;

    let layer = match config.format {
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(config.targets);
            if config.timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(config.targets)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;
    Ok(())
}
