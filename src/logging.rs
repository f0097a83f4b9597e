//! Logging bootstrap and per-component log context.
//!
//! [`init`] installs the `env_logger` backend once at startup according to
//! [`LoggingConfig`] and returns a [`LogGuard`] that flushes on drop.
//! Components never name a logger themselves: each receives a [`LogContext`]
//! at construction and logs under its target.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{LoggingBehavior, LoggingConfig};

/// Log target handed to a component at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    target: String,
}

impl LogContext {
    /// Context logging under `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Context for a sub-component: `parent::name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        Self {
            target: format!("{}::{}", self.target, name),
        }
    }

    /// Target string for `log` macros.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Flushes the logger when dropped. Hold it for the life of the process.
#[derive(Debug)]
#[must_use = "dropping the guard flushes logging immediately"]
pub struct LogGuard {
    enabled: bool,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if self.enabled {
            log::logger().flush();
        }
    }
}

/// Writes every record to stdout and to a log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()?;
        self.file.flush()
    }
}

/// Resolve the file a file-based behavior writes to.
fn log_file_path(config: &LoggingConfig, room_id: &str) -> Result<PathBuf> {
    let path = config
        .path
        .as_deref()
        .context("logging.path must be set for file logging")?;

    if config.behavior == LoggingBehavior::FileDirectory {
        Ok(path.join(format!("slotkeeper_{room_id}.log")))
    } else {
        Ok(path.to_path_buf())
    }
}

fn open_log_file(behavior: LoggingBehavior, path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = if behavior == LoggingBehavior::FileAppend {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(path)
    };
    file.with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Install the process-wide logger.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Fails if the level is invalid, the log file cannot be opened, or a logger
/// was already installed.
pub fn init(config: &LoggingConfig, room_id: &str) -> Result<LogGuard> {
    if config.behavior == LoggingBehavior::None {
        log::set_max_level(log::LevelFilter::Off);
        return Ok(LogGuard { enabled: false });
    }

    let level = config.level_filter()?.to_string().to_lowercase();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format_timestamp_secs();

    if config.behavior.uses_file() {
        let path = log_file_path(config, room_id)?;
        let file = open_log_file(config.behavior, &path)?;
        builder
            .target(env_logger::Target::Pipe(Box::new(Tee { file })))
            .write_style(env_logger::WriteStyle::Never);
    } else {
        let style = if config.color {
            env_logger::WriteStyle::Always
        } else {
            env_logger::WriteStyle::Never
        };
        builder.target(env_logger::Target::Stdout).write_style(style);
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(LogGuard { enabled: true })
}
