//! Logger module
//!
//! Provides logging utilities for the comment server including:
//! - `tracing` subscriber setup (stderr or an append-only file)
//! - Server lifecycle logging
//! - Access logging (combined, common or JSON lines)

mod format;

pub use format::AccessLogEntry;

use std::fs::{File, OpenOptions};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::{AccessLogFormat, Config, LoggingConfig};

/// Target used for access log lines so they can be filtered separately
pub const ACCESS_TARGET: &str = "access";

/// Initialize the global subscriber
///
/// Should be called once at application startup. `RUST_LOG` takes
/// precedence over the configured level.
pub fn init(config: &LoggingConfig) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.log_file.as_deref() {
        Some(path) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(open_log_file(path)?))
            .try_init(),
        None => builder.with_writer(io::stderr).try_init(),
    };
    result.map_err(io::Error::other)
}

/// Open a log file for appending, creating parent directories
fn open_log_file(path: &str) -> io::Result<File> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    tracing::info!(
        address = %addr,
        comments = %config.comments.root,
        prefix = %config.comments.url_prefix,
        hash = %config.comments.hash_algorithm,
        "freecomment listening on http://{addr}"
    );
    if let Some(workers) = config.server.workers {
        tracing::info!(workers, "worker threads");
    }
    if config.akismet.is_enabled() {
        tracing::info!(blog = %config.akismet.blog_url, "akismet spam check enabled");
    }
    if config.notify.is_enabled() {
        tracing::info!(to = %config.notify.email, "new comment notifications enabled");
    }
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::error!("failed to serve connection: {err:?}");
}

pub fn log_error(message: &str) {
    tracing::error!("{message}");
}

pub fn log_warning(message: &str) {
    tracing::warn!("{message}");
}

pub fn log_access(entry: &AccessLogEntry, format: AccessLogFormat) {
    tracing::info!(target: ACCESS_TARGET, "{}", entry.render(format));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_log_file_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("freecomment.log");
        open_log_file(path.to_str().unwrap()).unwrap();
        assert!(path.is_file());
    }
}
