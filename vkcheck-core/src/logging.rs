//! Logging setup shared by the vkcheck binary and embedding harnesses.
//!
//! Events go to stderr (human-readable or JSON) and, optionally, to a JSON
//! log file written off-thread through `tracing-appender`.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::EnvParser;

/// Output format for the stderr layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `vkcheck_core=debug`.
    pub level: String,
    pub format: LogFormat,
    /// Emit events on stderr.
    pub stderr: bool,
    /// Colourise stderr output (pretty format only).
    pub ansi: bool,
    /// Additional JSON log file.
    pub file: Option<PathBuf>,
    /// Problems found while reading the environment, reported once logging is up.
    env_warnings: Vec<String>,
}

impl LogConfig {
    pub fn new(level: &str) -> Self {
        Self {
            level: level.to_string(),
            format: LogFormat::Pretty,
            stderr: false,
            ansi: true,
            file: None,
            env_warnings: Vec::new(),
        }
    }

    /// Read `VKCHECK_LOG_LEVEL`, `VKCHECK_LOG_FORMAT`, `VKCHECK_LOG_ANSI` and
    /// `VKCHECK_LOG_FILE`, falling back to `default_level`.
    ///
    /// Invalid values fall back to defaults and are logged as warnings by
    /// [`init_logging`].
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::new();
        let level = parser.get_log_level("LOG_LEVEL", default_level);
        let format = parser.get_choice("LOG_FORMAT", &["pretty", "json"], "pretty");
        let ansi = parser.get_bool("LOG_ANSI", true);
        let file = parser.get_optional_path("LOG_FILE");

        Self {
            level: level.value,
            format: if format.value == "json" {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            stderr: false,
            ansi: ansi.value,
            file: file.value,
            env_warnings: parser.errors().iter().map(ToString::to_string).collect(),
        }
    }

    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.format = if json { LogFormat::Json } else { LogFormat::Pretty };
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        // RUST_LOG wins when it is set and parses.
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|source| LoggingError::Filter {
            directive: self.level.clone(),
            source,
        })
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

/// Keeps background log writers alive; drop it last.
#[must_use = "dropping the guards stops file logging"]
#[derive(Default)]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("Cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Global subscriber already installed: {0}")]
    Init(#[from] TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let filter = config.filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards = LoggingGuards::default();

    if config.stderr {
        let layer = match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .with_target(false)
                .boxed(),
        };
        layers.push(layer);
    }

    if let Some(path) = &config.file {
        let (dir, file_name) = split_log_path(path)?;
        std::fs::create_dir_all(&dir).map_err(|source| LoggingError::File {
            path: path.clone(),
            source,
        })?;
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        );
        guards._file = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    for warning in &config.env_warnings {
        tracing::warn!("{warning}");
    }
    Ok(guards)
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError> {
    let file_name = path.file_name().ok_or_else(|| LoggingError::File {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(file_name)))
}
