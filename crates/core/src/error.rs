//! Error taxonomy for the forwarding pipeline.
//!
//! Run-scoped errors ([`ConfigError`], [`FetchError`], and [`StorageError`] raised before a
//! send) end the run and surface as [`PipelineError`]. Item-scoped errors ([`BuildError`],
//! [`DispatchError`], and [`StorageError`] raised while recording a completed send) are logged
//! by the pipeline and never leave it.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("missing required setting {0}")]
    Missing(String),
    #[error("invalid {field}: {source}")]
    InvalidText {
        field: &'static str,
        #[source]
        source: orm_types::TextError,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open dedup store (path: {path}): {source}", path = path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create dedup schema: {0}")]
    Schema(rusqlite::Error),
    #[error("failed to query dedup store: {0}")]
    Query(rusqlite::Error),
    #[error("failed to write dedup store: {0}")]
    Write(rusqlite::Error),
    #[error("invalid timestamp in dedup store: {0}")]
    InvalidTimestamp(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failures of one DIMSE exchange, shared by the worklist query and order delivery.
#[derive(Debug, thiserror::Error)]
pub enum DimseError {
    #[error("failed to establish association with {peer}: {reason}")]
    Association { peer: String, reason: String },
    #[error("{peer} accepted no presentation context")]
    NoPresentationContext { peer: String },
    #[error("network failure: {0}")]
    Network(String),
    #[error("unexpected PDU from peer: {0}")]
    UnexpectedPdu(String),
    #[error(transparent)]
    Wire(#[from] dicom_wire::WireError),
    #[error("network task failed: {0}")]
    Task(String),
}

pub type DimseResult<T> = std::result::Result<T, DimseError>;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("worklist query failed: {0}")]
    Dimse(#[from] DimseError),
    #[error("worklist query ended with status {status:#06X}")]
    Rejected { status: u16 },
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("work item has no accession number")]
    MissingAccessionNumber,
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("order delivery failed: {0}")]
    Dimse(#[from] DimseError),
    #[error("order rejected with status {status:#06X}")]
    Rejected { status: u16 },
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("dedup store failed: {0}")]
    Storage(#[from] StorageError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
