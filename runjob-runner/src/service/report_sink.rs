//! Report sinks
//!
//! Where the final report of a run goes: a file, overwritten with default
//! permissions, or standard output.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Destination of the run report
///
/// A sink is written at most once per run.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Writes the full report
    ///
    /// # Arguments
    /// * `contents` - Status line and rendered report
    async fn write(&self, contents: &str) -> std::io::Result<()>;

    /// File the report is written to, if any
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Writes the report to standard output
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

#[async_trait]
impl ReportSink for StdoutSink {
    async fn write(&self, contents: &str) -> std::io::Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"\n").await?;
        stdout.write_all(contents.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await
    }
}

/// Writes the report to a file, replacing any previous content
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSink for FileSink {
    async fn write(&self, contents: &str) -> std::io::Result<()> {
        debug!("Writing report to {}", self.path.display());
        tokio::fs::write(&self.path, contents).await
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Sink keeping every write in memory
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct MemorySink {
    writes: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    fail: bool,
}

#[cfg(test)]
impl MemorySink {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ReportSink for MemorySink {
    async fn write(&self, contents: &str) -> std::io::Result<()> {
        if self.fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "report destination is read-only",
            ));
        }
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(contents.to_string());
        Ok(())
    }
}
