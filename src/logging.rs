//! File-backed `tracing` output.
//!
//! A terminal program cannot log to its own stdout or stderr while it owns the
//! screen, so runtime diagnostics go to a file instead.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::runtime::context::lock;

const DEFAULT_FILTER: &str = "debug";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file: {0}")]
    Open(#[source] io::Error),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Prepends a fixed prefix to every formatted event.
struct PrefixedFile {
    file: File,
    prefix: String,
}

impl Write for PrefixedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.prefix.is_empty() {
            self.file.write_all(self.prefix.as_bytes())?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// The log file shared between the subscriber and the [`LogGuard`].
#[derive(Clone)]
struct SharedFile(Arc<Mutex<PrefixedFile>>);

/// Holds the file lock for one formatted event.
struct LockedFile<'a>(MutexGuard<'a, PrefixedFile>);

impl Write for LockedFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = LockedFile<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LockedFile(lock(&self.0))
    }
}

/// Flushes the log file when dropped.
#[must_use = "dropping the guard flushes and stops tracking the log file"]
pub struct LogGuard {
    file: SharedFile,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        let _ = lock(&self.file.0).flush();
    }
}

/// Build a dispatcher that appends formatted events to `path`.
///
/// `RUST_LOG` selects what is recorded; without it everything at `debug` and above is kept.
pub fn file_dispatch(
    path: impl AsRef<Path>,
    prefix: &str,
) -> Result<(Dispatch, LogGuard), LoggingError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(LoggingError::Open)?;
    let shared = SharedFile(Arc::new(Mutex::new(PrefixedFile {
        file,
        prefix: prefix.to_string(),
    })));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(shared.clone())
        .finish();

    Ok((Dispatch::new(subscriber), LogGuard { file: shared }))
}

/// Install file logging as the global subscriber.
pub fn log_to_file(path: impl AsRef<Path>, prefix: &str) -> Result<LogGuard, LoggingError> {
    let (dispatch, guard) = file_dispatch(path, prefix)?;
    tracing::dispatcher::set_global_default(dispatch).map_err(|_| LoggingError::AlreadyInstalled)?;
    Ok(guard)
}
