use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::analysis::series::{TimeSeries, TimestampMode};
use crate::error::ExportError;

pub const CSV_MIME_TYPE: &str = "text/csv";
pub const DEFAULT_FILE_NAME: &str = "motion_analysis.csv";

/// One-shot destination for an exported artifact.
pub trait ExportSink {
    fn deliver(&mut self, bytes: &[u8], file_name: &str, mime_type: &str) -> Result<()>;
}

/// Writes artifacts into a directory on disk.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ExportSink for FileSink {
    fn deliver(&mut self, bytes: &[u8], file_name: &str, mime_type: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory: {}", self.dir.display()))?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote {} ({}, {} bytes)", path.display(), mime_type, bytes.len());
        Ok(())
    }
}

/// Serializes a time series to CSV and hands it to a sink.
pub struct CsvExporter {
    sink: Box<dyn ExportSink>,
    timestamps: TimestampMode,
    file_name: String,
}

impl CsvExporter {
    pub fn new(sink: Box<dyn ExportSink>, timestamps: TimestampMode, file_name: impl Into<String>) -> Self {
        Self {
            sink,
            timestamps,
            file_name: file_name.into(),
        }
    }

    /// Name the artifact after the analyzed video.
    pub fn for_video(sink: Box<dyn ExportSink>, timestamps: TimestampMode, video: Option<&Path>) -> Self {
        Self::new(sink, timestamps, file_name_for_video(video))
    }

    /// Write to an explicit file path.
    pub fn to_path(path: &Path, timestamps: TimestampMode) -> Result<Self, ExportError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ExportError::InvalidPath(path.to_path_buf()))?
            .to_string();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self::new(Box::new(FileSink::new(dir)), timestamps, file_name))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn timestamps(&self) -> TimestampMode {
        self.timestamps
    }

    /// Deliver the series. On failure the series is untouched and the call
    /// can be repeated.
    pub fn export(&mut self, series: &TimeSeries) -> Result<&str, ExportError> {
        let csv = series.to_csv(self.timestamps.header());
        self.sink
            .deliver(csv.as_bytes(), &self.file_name, CSV_MIME_TYPE)
            .map_err(|source| ExportError::Delivery {
                file_name: self.file_name.clone(),
                source,
            })?;
        Ok(&self.file_name)
    }
}

/// `<stem>_motion_analysis.csv`, or the default name when the video name is unknown.
pub fn file_name_for_video(video: Option<&Path>) -> String {
    video
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(|stem| format!("{}_{}", stem, DEFAULT_FILE_NAME))
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string())
}
