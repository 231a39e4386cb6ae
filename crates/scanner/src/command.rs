//! JSON command protocol.
//!
//! Lets scripts and the HTTP bridge drive a [`Scanner`] with messages like
//! `{"command": "export", "format": "stl"}`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use shared::ExportFormat;

use crate::error::ScanError;
use crate::scanner::Scanner;

/// A command a client can execute against the scanner.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ScanCommand {
    /// Begin (or restart) a capture.
    StartScan,
    /// Freeze the current scene.
    StopScan,
    /// Export the captured scene. Without `path` the default artifact path is used.
    Export {
        format: String,
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Upload an artifact. Without `path` the latest export is sent.
    Upload {
        destination: String,
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Report session state, scene summary and latest artifact.
    Status,
}

/// Response from executing a command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
            kind: None,
            data: None,
        }
    }

    fn ok_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            error: None,
            kind: None,
            data: Some(data),
        }
    }

    fn err(kind: &str, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            kind: Some(kind.to_string()),
            data: None,
        }
    }
}

impl From<ScanError> for CommandResponse {
    fn from(e: ScanError) -> Self {
        CommandResponse::err(e.kind(), e.to_string())
    }
}

/// Execute a single command on the scanner.
pub async fn execute_command(scanner: &Scanner, cmd: ScanCommand) -> CommandResponse {
    tracing::debug!(?cmd, "execute");
    match cmd {
        ScanCommand::StartScan => match scanner.start_scan().await {
            Ok(()) => CommandResponse::ok(),
            Err(e) => e.into(),
        },

        ScanCommand::StopScan => match scanner.stop_scan().await {
            Ok(scene) => CommandResponse::ok_with_data(serde_json::json!({ "summary": scene.summary() })),
            Err(e) => e.into(),
        },

        ScanCommand::Export { format, path } => {
            let format = match ExportFormat::from_name(&format) {
                Ok(format) => format,
                Err(e) => return CommandResponse::err("unknown_format", e.to_string()),
            };
            let result = match path {
                Some(path) => scanner.export_to(format, &path).await,
                None => scanner.export(format).await,
            };
            match result {
                Ok(artifact) => CommandResponse::ok_with_data(serde_json::json!({ "artifact": artifact })),
                Err(e) => e.into(),
            }
        }

        ScanCommand::Upload { destination, path } => {
            let result = match path {
                Some(path) => {
                    let format = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .and_then(|e| ExportFormat::from_name(e).ok());
                    let Some(format) = format else {
                        return CommandResponse::err(
                            "unknown_format",
                            format!("cannot tell the format of {}", path.display()),
                        );
                    };
                    let byte_len = std::fs::metadata(&path).map_or(0, |m| m.len());
                    let artifact = shared::Artifact {
                        path,
                        byte_len,
                        format,
                    };
                    scanner.upload(&artifact, &destination).await
                }
                None => scanner.upload_latest(&destination).await,
            };
            match result {
                Ok(receipt) => CommandResponse::ok_with_data(serde_json::json!({ "receipt": receipt })),
                Err(e) => e.into(),
            }
        }

        ScanCommand::Status => match serde_json::to_value(scanner.status()) {
            Ok(status) => CommandResponse::ok_with_data(status),
            Err(e) => CommandResponse::err("internal", e.to_string()),
        },
    }
}

/// Parse and execute a single JSON command string.
pub async fn execute_json(scanner: &Scanner, json: &str) -> Result<CommandResponse, String> {
    let cmd: ScanCommand =
        serde_json::from_str(json).map_err(|e| format!("Invalid command JSON: {e}"))?;
    Ok(execute_command(scanner, cmd).await)
}

/// Parse and execute multiple JSON commands (array), in order.
pub async fn execute_json_batch(
    scanner: &Scanner,
    json: &str,
) -> Result<Vec<CommandResponse>, String> {
    let cmds: Vec<ScanCommand> =
        serde_json::from_str(json).map_err(|e| format!("Invalid commands JSON: {e}"))?;
    let mut responses = Vec::with_capacity(cmds.len());
    for cmd in cmds {
        responses.push(execute_command(scanner, cmd).await);
    }
    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TestHarness;

    #[test]
    fn test_command_serde_start_scan() {
        let cmd: ScanCommand = serde_json::from_str(r#"{"command": "start_scan"}"#).unwrap();
        assert!(matches!(cmd, ScanCommand::StartScan));
    }

    #[test]
    fn test_command_serde_export() {
        let json = r#"{"command": "export", "format": "stl"}"#;
        match serde_json::from_str(json).unwrap() {
            ScanCommand::Export { format, path } => {
                assert_eq!(format, "stl");
                assert!(path.is_none());
            }
            other => panic!("Expected Export, got {other:?}"),
        }
    }

    #[test]
    fn test_command_serde_upload_with_path() {
        let json = r#"{"command": "upload", "destination": "https://example/ingest", "path": "/tmp/scan.glb"}"#;
        match serde_json::from_str(json).unwrap() {
            ScanCommand::Upload { destination, path } => {
                assert_eq!(destination, "https://example/ingest");
                assert_eq!(path, Some(PathBuf::from("/tmp/scan.glb")));
            }
            other => panic!("Expected Upload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_export_before_capture() {
        let h = TestHarness::new();
        let resp = execute_json(&h.scanner, r#"{"command": "export", "format": "obj"}"#)
            .await
            .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.kind.as_deref(), Some("no_scene"));
    }

    #[tokio::test]
    async fn test_execute_unknown_format() {
        let h = TestHarness::new();
        h.capture().await.unwrap();
        let resp = execute_json(&h.scanner, r#"{"command": "export", "format": "ply"}"#)
            .await
            .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.kind.as_deref(), Some("unknown_format"));
    }

    #[tokio::test]
    async fn test_execute_status() {
        let h = TestHarness::new();
        let resp = execute_json(&h.scanner, r#"{"command": "status"}"#).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["state"], "idle");
    }

    #[tokio::test]
    async fn test_execute_invalid_json() {
        let h = TestHarness::new();
        assert!(execute_json(&h.scanner, "not json").await.is_err());
        assert!(execute_json(&h.scanner, r#"{"command": "teleport"}"#).await.is_err());
    }

    #[tokio::test]
    async fn test_error_response_serialization() {
        let resp = CommandResponse::from(ScanError::ExportBusy);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["kind"], "export_busy");
        assert!(json.get("data").is_none());
    }
}
