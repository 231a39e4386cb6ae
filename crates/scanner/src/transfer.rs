//! Artifact transfer.
//!
//! Sends a finished artifact to a remote destination in one request. The
//! artifact file and the destination are both checked at call time; nothing
//! is retried or chunked.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use shared::{Artifact, Receipt, ScanEvent};

use crate::error::{ScanError, ScanResult, TransportError};
use crate::events::EventBus;
use crate::settings::UploadSettings;

/// Moves bytes to a destination
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `bytes` to `destination` in a single request
    async fn send(
        &self,
        bytes: Vec<u8>,
        destination: &Url,
        content_type: &str,
    ) -> Result<(), TransportError>;
}

/// HTTP POST transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &UploadSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| TransportError(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        bytes: Vec<u8>,
        destination: &Url,
        content_type: &str,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(destination.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError(format!("server responded {status}")));
        }
        Ok(())
    }
}

/// Uploads artifacts through a [`Transport`]
pub struct TransferHandoff {
    transport: Arc<dyn Transport>,
    events: EventBus,
}

impl TransferHandoff {
    pub fn new(transport: Arc<dyn Transport>, events: EventBus) -> Self {
        Self { transport, events }
    }

    /// Send `artifact` to `destination`
    pub async fn upload(&self, artifact: &Artifact, destination: &str) -> ScanResult<Receipt> {
        let result = self.try_upload(artifact, destination).await;
        match &result {
            Ok(receipt) => {
                tracing::info!("{}", receipt.message);
                self.events.emit(ScanEvent::UploadSucceeded {
                    receipt: receipt.clone(),
                });
            }
            Err(e) => {
                tracing::error!("Upload of {} failed: {e}", artifact.path.display());
                self.events.emit(ScanEvent::UploadFailed {
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    async fn try_upload(&self, artifact: &Artifact, destination: &str) -> ScanResult<Receipt> {
        let bytes = read_artifact(&artifact.path).await?;
        let url = parse_destination(destination)?;

        tracing::info!("Uploading {} bytes to {url}", bytes.len());
        let byte_len = bytes.len() as u64;
        self.transport
            .send(bytes, &url, artifact.format.content_type())
            .await?;

        Ok(Receipt::new(destination, byte_len))
    }
}

async fn read_artifact(path: &Path) -> ScanResult<Vec<u8>> {
    let missing = || ScanError::ArtifactMissing {
        path: path.to_path_buf(),
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(missing()),
    }
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => missing(),
        _ => ScanError::TransferError {
            cause: format!("reading {}: {e}", path.display()),
        },
    })
}

/// Accept absolute `http`/`https` URLs with a host
pub fn parse_destination(destination: &str) -> ScanResult<Url> {
    let invalid = |reason: String| ScanError::InvalidDestination {
        destination: destination.to_string(),
        reason,
    };
    let url = Url::parse(destination).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{FailingTransport, RecordingTransport};
    use shared::ExportFormat;

    fn artifact_in(dir: &tempfile::TempDir, bytes: &[u8]) -> Artifact {
        let path = dir.path().join("scan.stl");
        std::fs::write(&path, bytes).unwrap();
        Artifact {
            path,
            byte_len: bytes.len() as u64,
            format: ExportFormat::FacetFormat,
        }
    }

    #[test]
    fn test_parse_destination() {
        assert!(parse_destination("https://example/ingest").is_ok());
        assert!(parse_destination("http://127.0.0.1:8080/up").is_ok());

        for bad in ["", "not a url", "ftp://example/x", "file:///tmp/x", "/relative/path"] {
            let err = parse_destination(bad).unwrap_err();
            assert_eq!(err.kind(), "invalid_destination", "{bad}");
        }
    }

    #[tokio::test]
    async fn test_upload_delivers_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_in(&dir, b"solid scan\nendsolid scan\n");
        let transport = Arc::new(RecordingTransport::new());
        let handoff = TransferHandoff::new(transport.clone(), EventBus::new());

        let receipt = handoff.upload(&artifact, "https://example/ingest").await.unwrap();
        assert_eq!(receipt.destination, "https://example/ingest");
        assert_eq!(receipt.byte_len, artifact.byte_len);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "https://example/ingest");
        assert_eq!(sent[0].content_type, "model/stl");
        assert_eq!(sent[0].bytes, b"solid scan\nendsolid scan\n");
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_in(&dir, b"x");
        std::fs::remove_file(&artifact.path).unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let handoff = TransferHandoff::new(transport.clone(), EventBus::new());

        let err = handoff.upload(&artifact, "https://example/ingest").await.unwrap_err();
        assert!(matches!(err, ScanError::ArtifactMissing { .. }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_destination_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_in(&dir, b"x");
        let transport = Arc::new(RecordingTransport::new());
        let handoff = TransferHandoff::new(transport.clone(), EventBus::new());

        let err = handoff.upload(&artifact, "mailto:someone").await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidDestination { .. }));
        assert!(!err.is_retry_safe());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_in(&dir, b"x");
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let handoff = TransferHandoff::new(Arc::new(FailingTransport::new("connection reset")), events);

        let err = handoff.upload(&artifact, "https://example/ingest").await.unwrap_err();
        assert_eq!(
            err,
            ScanError::TransferError {
                cause: "connection reset".into()
            }
        );
        assert!(err.is_retry_safe());
        match rx.recv().await.unwrap() {
            ScanEvent::UploadFailed { reason } => assert!(reason.contains("connection reset")),
            other => panic!("Expected UploadFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_event() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_in(&dir, b"abc");
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let handoff = TransferHandoff::new(Arc::new(RecordingTransport::new()), events);

        let receipt = handoff.upload(&artifact, "https://example/ingest").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ScanEvent::UploadSucceeded { receipt });
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(&UploadSettings::default()).is_ok());
    }
}
