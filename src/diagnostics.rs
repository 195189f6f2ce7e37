//! Diagnostics sink: the append-only ORCID log file.
//!
//! One line per event, `<timestamp> <LEVEL> <message>`. Errors are always
//! written; info lines only when the journal's log level is `ALL`. Every
//! line is mirrored to `tracing`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[default]
    Error,
    All,
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "ALL" => Ok(LogLevel::All),
            other => anyhow::bail!("invalid log level: {}. Must be 'ERROR' or 'ALL'", other),
        }
    }
}

struct FileSink {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

impl FileSink {
    /// Open `path` for appending behind a background writer thread.
    fn open(path: &Path) -> Option<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path.file_name()?.to_string_lossy().into_owned();

        match RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name)
            .build(dir)
        {
            Ok(appender) => {
                let (writer, guard) = NonBlockingBuilder::default().lossy(false).finish(appender);
                Some(Self {
                    writer,
                    _guard: guard,
                })
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot open diagnostics log: {}", e);
                None
            }
        }
    }
}

pub struct Diagnostics {
    path: Option<PathBuf>,
    sink: RwLock<Option<FileSink>>,
}

impl Diagnostics {
    /// Append to the log file at `path`. If the file cannot be opened the
    /// sink still forwards to `tracing`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sink = FileSink::open(&path);
        Self {
            path: Some(path),
            sink: RwLock::new(sink),
        }
    }

    /// A sink that only forwards to `tracing`.
    pub fn disabled() -> Self {
        Self {
            path: None,
            sink: RwLock::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!(target: "orcid_sync::diagnostics", "{}", message);
        self.write("ERROR", message);
    }

    pub fn info(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "orcid_sync::diagnostics", "{}", message);
        if level == LogLevel::All {
            self.write("INFO", message);
        }
    }

    /// Block until every line written so far is on disk.
    pub fn flush(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let mut sink = self.sink.write().unwrap_or_else(PoisonError::into_inner);
        // dropping the worker guard drains the queue
        drop(sink.take());
        *sink = FileSink::open(path);
    }

    fn write(&self, level: &str, message: &str) {
        let line = format!(
            "{} {} {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            message
        );

        let sink = self.sink.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = sink.as_ref() else {
            return;
        };
        let mut writer = sink.writer.clone();
        if let Err(e) = writer.write_all(line.as_bytes()) {
            tracing::warn!("failed to write diagnostics log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(sink: &Diagnostics, path: &Path) -> Vec<String> {
        sink.flush();
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_error_level_suppresses_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orcid.log");
        let sink = Diagnostics::new(&path);

        sink.info(LogLevel::Error, "request body");
        sink.error("token expired");

        let written = lines(&sink, &path);
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with(" ERROR token expired"), "got: {}", written[0]);
    }

    #[test]
    fn test_all_level_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orcid.log");
        let sink = Diagnostics::new(&path);

        sink.info(LogLevel::All, "POST https://api.orcid.org/v2.1/x/work");
        sink.error("Unexpected status 500");

        let written = lines(&sink, &path);
        assert_eq!(written.len(), 2);
        assert!(written[0].contains(" INFO POST "));
        assert!(written[1].contains(" ERROR Unexpected status 500"));
    }

    #[test]
    fn test_line_starts_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orcid.log");
        let sink = Diagnostics::new(&path);
        sink.error("x");

        let line = &lines(&sink, &path)[0];
        // 2019-03-07 12:00:00.123 ERROR x
        let stamp: String = line.chars().take(23).collect();
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S%.3f").is_ok());
    }

    #[test]
    fn test_lines_survive_flush_and_keep_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orcid.log");
        let sink = Diagnostics::new(&path);

        sink.error("first");
        sink.flush();
        sink.error("second");

        let written = lines(&sink, &path);
        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with(" ERROR second"));
    }

    #[test]
    fn test_disabled_sink_writes_nothing() {
        let sink = Diagnostics::disabled();
        sink.error("dropped");
        sink.flush();
        assert!(sink.path().is_none());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("all".parse::<LogLevel>().unwrap(), LogLevel::All);
        assert_eq!("ERROR".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("debug".parse::<LogLevel>().is_err());
    }
}
