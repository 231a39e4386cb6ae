//! Error taxonomy of the scanner core.
//!
//! Every public operation returns [`ScanError`]. Nothing is retried by the
//! core; callers use [`ScanError::kind`] to render a message and
//! [`ScanError::is_retry_safe`] to decide whether repeating the same call
//! makes sense.

use std::path::PathBuf;

use shared::ExportFormat;
use thiserror::Error;

/// Result alias for scanner operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Why an encoder gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportCause {
    #[error("scene has no exportable geometry")]
    EmptyScene,

    #[error("encoding failed: {0}")]
    EncodingFailure(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),
}

/// Encoder failure tagged with the format it was producing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{format} export failed: {cause}")]
pub struct ExportError {
    pub format: ExportFormat,
    pub cause: ExportCause,
}

impl ExportError {
    pub fn new(format: ExportFormat, cause: ExportCause) -> Self {
        Self { format, cause }
    }

    pub fn empty_scene(format: ExportFormat) -> Self {
        Self::new(format, ExportCause::EmptyScene)
    }

    pub fn encoding(format: ExportFormat, message: impl Into<String>) -> Self {
        Self::new(format, ExportCause::EncodingFailure(message.into()))
    }

    pub fn io(format: ExportFormat, err: impl std::fmt::Display) -> Self {
        Self::new(format, ExportCause::IoFailure(err.to_string()))
    }
}

/// Failure reported by a reconstruction engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("scene reconstruction is not supported on this device")]
    Unavailable,

    #[error("engine accumulated no mesh geometry")]
    NoGeometry,

    #[error("engine failure: {0}")]
    Other(String),
}

/// Failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Errors surfaced by the four public operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    #[error("scene reconstruction is unavailable: {0}")]
    EngineUnavailable(String),

    #[error("another capture operation is still in progress")]
    OperationInProgress,

    #[error("the scan captured no geometry")]
    NoGeometry,

    #[error("no scene captured")]
    NoScene,

    #[error("an export is already running")]
    ExportBusy,

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("artifact file does not exist: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("invalid upload destination '{destination}': {reason}")]
    InvalidDestination { destination: String, reason: String },

    #[error("transfer failed: {cause}")]
    TransferError { cause: String },
}

impl ScanError {
    /// Stable machine-readable code
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::EngineUnavailable(_) => "engine_unavailable",
            ScanError::OperationInProgress => "operation_in_progress",
            ScanError::NoGeometry => "no_geometry",
            ScanError::NoScene => "no_scene",
            ScanError::ExportBusy => "export_busy",
            ScanError::Export(_) => "export_error",
            ScanError::ArtifactMissing { .. } => "artifact_missing",
            ScanError::InvalidDestination { .. } => "invalid_destination",
            ScanError::TransferError { .. } => "transfer_error",
        }
    }

    /// Whether repeating the same call, unchanged, can succeed later
    pub fn is_retry_safe(&self) -> bool {
        match self {
            ScanError::OperationInProgress
            | ScanError::ExportBusy
            | ScanError::TransferError { .. } => true,
            ScanError::Export(e) => matches!(e.cause, ExportCause::IoFailure(_)),
            ScanError::EngineUnavailable(_)
            | ScanError::NoGeometry
            | ScanError::NoScene
            | ScanError::ArtifactMissing { .. }
            | ScanError::InvalidDestination { .. } => false,
        }
    }
}

impl From<EngineError> for ScanError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable => ScanError::EngineUnavailable(err.to_string()),
            EngineError::NoGeometry => ScanError::NoGeometry,
            EngineError::Other(msg) => ScanError::EngineUnavailable(msg),
        }
    }
}

impl From<TransportError> for ScanError {
    fn from(err: TransportError) -> Self {
        ScanError::TransferError { cause: err.0 }
    }
}
