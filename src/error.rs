use std::path::PathBuf;

/// Errors surfaced by an analysis run.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("an analysis run is already in progress")]
    AlreadyRunning,

    #[error("target frame rate must be a positive number, got {0}")]
    InvalidFrameRate(f64),

    #[error("failed to start playback")]
    Playback(#[source] anyhow::Error),

    #[error("frame capture failed at {time:.3}s")]
    CaptureFailed {
        time: f64,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("frame shapes differ: {current_width}x{current_height} vs {previous_width}x{previous_height}")]
    ShapeMismatch {
        current_width: u32,
        current_height: u32,
        previous_width: u32,
        previous_height: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to deliver {file_name}")]
    Delivery {
        file_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid output path: {}", .0.display())]
    InvalidPath(PathBuf),
}
