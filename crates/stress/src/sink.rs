//! Append-only record of accepted transaction identifiers.
//!
//! Layout: a `#`-prefixed header with the run parameters, a blank line, one
//! identifier per line, then a `# === SUMMARY ===` block written once.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;

use crate::dispatcher::FinalReport;
use crate::errors::{Result, StressError};

/// Run parameters written at the top of the artifact.
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub fields: Vec<(String, String)>,
}

impl RunHeader {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started_at: Utc::now(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }
}

pub struct ResultSink {
    writer: Mutex<Box<dyn Write + Send>>,
    unrecorded: AtomicU64,
}

impl ResultSink {
    /// Create (truncating) the artifact at `path` and write the header.
    pub fn create(path: &Path, header: &RunHeader) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StressError::Output {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(path).map_err(|source| StressError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_writer(BufWriter::new(file), header)
    }

    pub fn from_writer(writer: impl Write + Send + 'static, header: &RunHeader) -> Result<Self> {
        let mut writer: Box<dyn Write + Send> = Box::new(writer);
        writeln!(
            writer,
            "# {} - {}",
            header.label,
            header.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        for (key, value) in &header.fields {
            writeln!(writer, "# {key}: {value}")?;
        }
        writeln!(writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            unrecorded: AtomicU64::new(0),
        })
    }

    /// Append one identifier. The lock covers only this line. A failed write
    /// is counted in [`ResultSink::unrecorded`].
    pub fn record(&self, identifier: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Err(err) = writeln!(writer, "{identifier}") {
            self.unrecorded.fetch_add(1, Ordering::Relaxed);
            return Err(err.into());
        }
        Ok(())
    }

    /// Identifiers that were accepted by the node but never made it to the file.
    pub fn unrecorded(&self) -> u64 {
        self.unrecorded.load(Ordering::Relaxed)
    }

    /// Write the trailing summary and flush everything to disk.
    pub fn write_summary(&self, report: &FinalReport) -> Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer)?;
        writeln!(writer, "# === SUMMARY ===")?;
        writeln!(writer, "# Total Sent: {}/{}", report.sent, report.planned)?;
        writeln!(writer, "# Errors: {}", report.errors)?;
        writeln!(writer, "# Duration: {:.2}s", report.total_time.as_secs_f64())?;
        writeln!(writer, "# Target TPS: {}", report.target_tps)?;
        writeln!(writer, "# Actual TPS: {:.2}", report.actual_tps)?;
        writeln!(writer, "# Deviation: {:.2}%", report.deviation_pct)?;
        if report.unrecorded > 0 {
            writeln!(writer, "# Unrecorded: {}", report.unrecorded)?;
        }
        if report.interrupted {
            writeln!(writer, "# Interrupted: true")?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Identifiers recorded in an artifact, skipping header, summary and blank lines.
pub fn read_identifiers(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}
