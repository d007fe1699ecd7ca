use crate::{config::LoggingConfig, paths::AppDirs};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "rena.log";

/// Keeps the non-blocking file writer flushing until dropped.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig, dirs: &AppDirs) -> Result<LoggingGuard, LoggingError> {
    let directive = config.level.as_filter_directive();
    let env_filter = EnvFilter::try_new(directive).map_err(|source| LoggingError::ParseLevel {
        level: directive.to_string(),
        source,
    })?;

    let file = if config.file {
        Some(open_file_writer(config, dirs.log_dir())?)
    } else {
        None
    };

    let (writer, file_guard) = match file {
        Some((file, guard)) if config.stdout => (
            BoxMakeWriter::new(std::io::stderr.and(file)),
            Some(guard),
        ),
        Some((file, guard)) => (BoxMakeWriter::new(file), Some(guard)),
        // stdout belongs to command output, so console logging goes to stderr
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(config.stdout && !config.file)
        .with_writer(writer)
        .try_init()
        .map_err(LoggingError::SubscriberInstall)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn open_file_writer(
    config: &LoggingConfig,
    log_dir: &Path,
) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let file_stem = config.file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE);
    prune_old_logs(log_dir, file_stem, config.max_log_files.max(1));

    let appender = tracing_appender::rolling::daily(log_dir, file_stem);
    Ok(tracing_appender::non_blocking(appender))
}

/// Removes the oldest rotated files so at most `keep` remain. Returns how many were removed.
///
/// Runs before the subscriber is installed, so failures go to stderr.
fn prune_old_logs(dir: &Path, file_stem: &str, keep: usize) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("rena: cannot list log directory {}: {e}", dir.display());
            return 0;
        }
    };

    let mut logs: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(file_stem))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    if logs.len() <= keep {
        return 0;
    }
    logs.sort_by_key(|(_, modified)| *modified);

    let excess = logs.len() - keep;
    let mut removed = 0;
    for (path, _) in logs.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("rena: cannot remove old log {}: {e}", path.display()),
        }
    }
    removed
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse log level {level}: {source}")]
    ParseLevel {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(Box<dyn std::error::Error + Send + Sync>),
}
