//! Structured logging system
//!
//! Installs the global tracing subscriber:
//! - JSON or text output
//! - Level from configuration, overridable through `RUST_LOG`
//! - stdout or a size-rotated log file, written off the caller's thread

use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the background log writer alive; logs are flushed when dropped
pub struct Logger {
    _guard: WorkerGuard,
}

impl Logger {
    /// Initialize the logging system based on configuration
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

        let (writer, guard) = match config.output.as_str() {
            "stdout" => tracing_appender::non_blocking(io::stdout()),
            "file" => {
                let log_file = config
                    .log_file
                    .as_ref()
                    .context("log_file must be specified when output is 'file'")?;

                let appender =
                    RollingFileAppender::open(log_file, config.max_file_size, config.max_backups)?;
                tracing_appender::non_blocking(appender)
            }
            other => anyhow::bail!("Invalid output configuration: {}", other),
        };

        let fmt_layer = match config.format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(true)
                .with_thread_names(true)
                .with_target(true)
                .boxed(),
            "text" => fmt::layer()
                .with_writer(writer)
                .with_thread_names(true)
                .with_target(true)
                .boxed(),
            other => anyhow::bail!("Invalid format configuration: {}", other),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = %config.format,
            output = %config.output,
            "Logging system initialized"
        );

        Ok(Logger { _guard: guard })
    }
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {}", level),
    }
}

struct ActiveFile {
    file: File,
    size: usize,
}

/// Log file that is rotated to `name.1 .. name.N` once it grows past a limit
pub struct RollingFileAppender {
    path: PathBuf,
    max_file_size: usize,
    max_backups: usize,
    active: Mutex<Option<ActiveFile>>,
}

impl RollingFileAppender {
    /// Open (or create) the log file, creating its directory if needed
    pub fn open(path: &Path, max_file_size: usize, max_backups: usize) -> Result<Self> {
        path.file_name().context("Log file must have a filename")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create log directory")?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            max_file_size,
            max_backups,
            active: Mutex::new(None),
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    /// Shift `name.i` to `name.i+1`, dropping the oldest, then move the live file to `name.1`
    fn rotate(&self) -> io::Result<()> {
        let oldest = self.backup_path(self.max_backups);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }

        for index in (1..self.max_backups).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(index + 1))?;
            }
        }

        if self.path.exists() {
            std::fs::rename(&self.path, self.backup_path(1))?;
        }

        Ok(())
    }

    fn open_active(&self) -> io::Result<ActiveFile> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let size = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        Ok(ActiveFile { file, size })
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if guard.is_none() {
            *guard = Some(self.open_active()?);
        }

        let needs_rotation = guard
            .as_ref()
            .map_or(false, |active| active.size > 0 && active.size + buf.len() > self.max_file_size);

        if needs_rotation {
            *guard = None;
            self.rotate()?;
            *guard = Some(self.open_active()?);
        }

        match guard.as_mut() {
            Some(active) => {
                let written = active.file.write(buf)?;
                active.size += written;
                Ok(written)
            }
            None => Err(io::Error::new(io::ErrorKind::Other, "log file unavailable")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(active) => active.file.flush(),
            None => Ok(()),
        }
    }
}
