use std::path::PathBuf;

use thiserror::Error;

pub type ScanResult<T> = Result<T, ScanError>;

/// Fatal scan failures. Per-file problems never surface here; they are
/// recorded as flags on the affected catalog records.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The external decoder could not be executed. The scan does not begin.
    #[error("media decoder not found. Make sure ffmpeg/ffprobe are installed and visible on the command line")]
    DecoderNotFound,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The worker thread pool could not be created.
    #[error("failed to create worker pool: {0}")]
    WorkerPool(String),
}

/// Failures while loading or saving the persistent catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("error accessing catalog file {path}: {src}")]
    SnapshotIo { src: std::io::Error, path: PathBuf },

    #[error("failed to serialize catalog to {path}: {src}")]
    Serialization { src: String, path: PathBuf },

    #[error("failed to deserialize catalog from {path}: {src}")]
    Deserialization { src: String, path: PathBuf },

    #[error("catalog file {path} has format version {found}, expected {expected}")]
    VersionMismatch {
        found: u32,
        expected: u32,
        path: PathBuf,
    },
}
