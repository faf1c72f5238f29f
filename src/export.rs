//! Export sinks
//!
//! A sink receives the full registry snapshot, identified by a job name.
//! Failures are returned to the caller, which logs them; nothing retries.

use crate::error::ExportError;
use crate::metrics::MetricRegistry;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Destination for registry snapshots
pub trait ExportSink: Send + Sync {
    /// Publish the current state of `registry` under `job`
    fn push(&self, job: &str, registry: &MetricRegistry) -> Result<(), ExportError>;

    /// Human-readable destination, for logs
    fn describe(&self) -> String;
}

/// Writes `<dir>/<job>.prom` for a node-exporter style textfile collector
///
/// The file is replaced atomically: the snapshot goes to a temporary file in
/// the same directory which is then renamed over the target, so a collector
/// never reads a half-written file. Pushes through one sink are serialized,
/// and the snapshot is taken under that lock, so the last push to finish
/// always leaves the newest snapshot behind.
#[derive(Debug)]
pub struct TextfileSink {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl TextfileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the exposition file for `job`
    pub fn path_for(&self, job: &str) -> PathBuf {
        self.dir.join(format!("{job}.prom"))
    }
}

impl ExportSink for TextfileSink {
    fn push(&self, job: &str, registry: &MetricRegistry) -> Result<(), ExportError> {
        // the temp file name is shared by every push for this job
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let body = registry.encode_text()?;
        let target = self.path_for(job);
        let temp = self.dir.join(format!(".{job}.prom.tmp"));

        let write_err = |path: &Path| {
            let target = path.display().to_string();
            move |source| ExportError::Write { target, source }
        };

        fs::write(&temp, body.as_bytes()).map_err(write_err(&temp))?;
        fs::rename(&temp, &target).map_err(write_err(&target))?;

        tracing::debug!(
            path = %target.display(),
            bytes = body.len(),
            "Wrote metrics textfile"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("textfile:{}", self.dir.display())
    }
}

/// Writes each snapshot to an arbitrary writer (stdout in the binary)
///
/// Snapshots are separated by a `# job: <job>` comment line.
pub struct WriterSink<W> {
    writer: Mutex<W>,
    name: String,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            name: name.into(),
        }
    }

    /// Take the writer back, e.g. to inspect what was written
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WriterSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout(), "stdout")
    }
}

impl<W: Write + Send> ExportSink for WriterSink<W> {
    fn push(&self, job: &str, registry: &MetricRegistry) -> Result<(), ExportError> {
        let body = registry.encode_text()?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        writeln!(writer, "# job: {job}")
            .and_then(|()| writer.write_all(body.as_bytes()))
            .and_then(|()| writer.flush())
            .map_err(|source| ExportError::Write {
                target: self.name.clone(),
                source,
            })
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
