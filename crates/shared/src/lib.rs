use std::path::PathBuf;

use serde::{Deserialize, Serialize};

mod mesh;

pub use mesh::{MeshError, MeshNode, NodeId, Scene, SceneSummary};

/// Lifecycle state of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
    Captured,
}

/// Interchange format of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Binary scene container (GLB)
    Archive,
    /// Plain-text vertex/normal/face listing (OBJ)
    TextMesh,
    /// ASCII stereolithography facet list (STL)
    FacetFormat,
}

/// Format name not recognised by [`ExportFormat::from_name`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown export format '{0}'")]
pub struct UnknownFormat(pub String);

impl ExportFormat {
    /// File extension written for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Archive => "glb",
            ExportFormat::TextMesh => "obj",
            ExportFormat::FacetFormat => "stl",
        }
    }

    /// Short label for messages
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Archive => "Archive",
            ExportFormat::TextMesh => "OBJ",
            ExportFormat::FacetFormat => "STL",
        }
    }

    /// MIME type sent along with uploads
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Archive => "model/gltf-binary",
            ExportFormat::TextMesh => "model/obj",
            ExportFormat::FacetFormat => "model/stl",
        }
    }

    /// Parse a user-facing format name (case-insensitive).
    ///
    /// Accepts the format's own names as well as its file extension;
    /// `usdz` maps to the archive format.
    pub fn from_name(name: &str) -> Result<Self, UnknownFormat> {
        match name.trim().to_ascii_lowercase().as_str() {
            "archive" | "glb" | "usdz" => Ok(ExportFormat::Archive),
            "text_mesh" | "text-mesh" | "textmesh" | "obj" => Ok(ExportFormat::TextMesh),
            "facet_format" | "facet-format" | "facet" | "stl" => Ok(ExportFormat::FacetFormat),
            _ => Err(UnknownFormat(name.to_string())),
        }
    }

    /// All formats, in menu order
    pub fn all() -> &'static [ExportFormat] {
        &[
            ExportFormat::Archive,
            ExportFormat::TextMesh,
            ExportFormat::FacetFormat,
        ]
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// A completed export on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Absolute path of the written file
    pub path: PathBuf,
    pub byte_len: u64,
    pub format: ExportFormat,
}

/// Proof of a finished upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Destination the artifact was sent to, echoed back
    pub destination: String,
    pub byte_len: u64,
    pub message: String,
}

impl Receipt {
    pub fn new(destination: impl Into<String>, byte_len: u64) -> Self {
        let destination = destination.into();
        let message = format!("Uploaded to {destination}");
        Self {
            destination,
            byte_len,
            message,
        }
    }
}

/// Progress of one export request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExportJobState {
    Pending,
    Running,
    Succeeded { artifact: Artifact },
    Failed { reason: String },
}

/// One export request and where it got to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    pub format: ExportFormat,
    #[serde(flatten)]
    pub state: ExportJobState,
}

impl ExportJob {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            state: ExportJobState::Pending,
        }
    }
}

/// Notification emitted to the presentation layer, in operation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    ScanStarted,
    ScanStopped { summary: SceneSummary },
    ExportStarted { format: ExportFormat },
    ExportSucceeded { artifact: Artifact },
    ExportFailed { format: ExportFormat, reason: String },
    UploadSucceeded { receipt: Receipt },
    UploadFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_name() {
        assert_eq!(ExportFormat::from_name("STL").unwrap(), ExportFormat::FacetFormat);
        assert_eq!(ExportFormat::from_name("obj").unwrap(), ExportFormat::TextMesh);
        assert_eq!(ExportFormat::from_name("USDZ").unwrap(), ExportFormat::Archive);
        assert_eq!(ExportFormat::from_name(" glb ").unwrap(), ExportFormat::Archive);
        assert!(ExportFormat::from_name("fbx").is_err());
        assert!(ExportFormat::from_name("").is_err());
    }

    #[test]
    fn test_format_extensions() {
        let exts: Vec<_> = ExportFormat::all().iter().map(|f| f.extension()).collect();
        assert_eq!(exts, vec!["glb", "obj", "stl"]);
    }

    #[test]
    fn test_format_serde() {
        let json = serde_json::to_string(&ExportFormat::FacetFormat).unwrap();
        assert_eq!(json, "\"facet_format\"");
        let back: ExportFormat = serde_json::from_str("\"text_mesh\"").unwrap();
        assert_eq!(back, ExportFormat::TextMesh);
    }

    #[test]
    fn test_receipt_message() {
        let receipt = Receipt::new("https://example/ingest", 12);
        assert_eq!(receipt.destination, "https://example/ingest");
        assert_eq!(receipt.message, "Uploaded to https://example/ingest");
    }

    #[test]
    fn test_event_serde_tag() {
        let event = ScanEvent::ExportStarted {
            format: ExportFormat::Archive,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "export_started");
        assert_eq!(json["format"], "archive");
    }

    #[test]
    fn test_job_serde_flattened() {
        let job = ExportJob {
            format: ExportFormat::TextMesh,
            state: ExportJobState::Failed {
                reason: "disk full".into(),
            },
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "disk full");
        assert_eq!(json["format"], "text_mesh");
    }
}
