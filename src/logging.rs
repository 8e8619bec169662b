//! Tracing setup: a global stderr subscriber plus a per-task dispatch that
//! also writes to a log file.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::util::sanitize_file_name;

const DEFAULT_FILTER: &str = "browser_agent=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the process-wide subscriber (stderr only).
pub fn init_global() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

/// Subscriber for one task run.
pub struct TaskLog {
    pub dispatch: Dispatch,
    /// Log file, when task logging is enabled
    pub path: Option<PathBuf>,
}

/// Build the dispatch for a task: stderr plus `<LOG_DIR>/<timestamp>_<task>.log`.
pub fn task_dispatch(config: &Config, task: &str) -> io::Result<TaskLog> {
    let path = if config.task_log_enabled {
        Some(task_log_path(&config.log_dir, task))
    } else {
        None
    };

    let file_layer = match &path {
        Some(path) => {
            fs::create_dir_all(&config.log_dir)?;
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer);

    Ok(TaskLog {
        dispatch: Dispatch::new(subscriber),
        path,
    })
}

fn task_log_path(dir: &Path, task: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    dir.join(format!("{}_{}.log", stamp, sanitize_file_name(task)))
}
