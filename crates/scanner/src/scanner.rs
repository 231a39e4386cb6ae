//! Scanner facade.
//!
//! One [`Scanner`] owns one capture session, one export orchestrator, one
//! transfer handoff and the event bus they all publish to. Frontends (CLI,
//! command protocol, HTTP bridge) only talk to this type.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use shared::{Artifact, ExportFormat, ExportJob, Receipt, Scene, SceneSummary, ScanEvent, SessionState};
use tokio::sync::broadcast;

use crate::engine::ReconstructionEngine;
use crate::error::{ScanError, ScanResult};
use crate::events::EventBus;
use crate::export::ExportPipeline;
use crate::orchestrator::ExportOrchestrator;
use crate::session::CaptureSession;
use crate::settings::ScannerSettings;
use crate::transfer::{TransferHandoff, Transport};

/// Snapshot of everything a frontend shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannerStatus {
    pub state: SessionState,
    pub scene: Option<SceneSummary>,
    pub export_job: Option<ExportJob>,
    pub last_artifact: Option<Artifact>,
}

pub struct Scanner {
    session: Arc<CaptureSession>,
    orchestrator: ExportOrchestrator,
    transfer: TransferHandoff,
    events: EventBus,
}

impl Scanner {
    pub fn new(
        engine: Arc<dyn ReconstructionEngine>,
        transport: Arc<dyn Transport>,
        settings: ScannerSettings,
    ) -> Self {
        Self::with_pipeline(engine, transport, ExportPipeline::default(), settings)
    }

    /// Build with a custom export pipeline (e.g. another archive writer)
    pub fn with_pipeline(
        engine: Arc<dyn ReconstructionEngine>,
        transport: Arc<dyn Transport>,
        pipeline: ExportPipeline,
        settings: ScannerSettings,
    ) -> Self {
        let events = EventBus::new();
        let session = Arc::new(CaptureSession::new(engine, events.clone()));
        let orchestrator =
            ExportOrchestrator::new(Arc::clone(&session), pipeline, settings, events.clone());
        let transfer = TransferHandoff::new(transport, events.clone());
        Self {
            session,
            orchestrator,
            transfer,
            events,
        }
    }

    pub async fn start_scan(&self) -> ScanResult<()> {
        self.session.start_scan().await
    }

    pub async fn stop_scan(&self) -> ScanResult<Arc<Scene>> {
        self.session.stop_scan().await
    }

    pub async fn export(&self, format: ExportFormat) -> ScanResult<Artifact> {
        self.orchestrator.export(format).await
    }

    pub async fn export_to(&self, format: ExportFormat, path: &Path) -> ScanResult<Artifact> {
        self.orchestrator.export_to(format, path).await
    }

    pub async fn upload(&self, artifact: &Artifact, destination: &str) -> ScanResult<Receipt> {
        self.transfer.upload(artifact, destination).await
    }

    /// Upload the most recent successful artifact
    pub async fn upload_latest(&self, destination: &str) -> ScanResult<Receipt> {
        let artifact = self.orchestrator.last_artifact().ok_or_else(|| {
            tracing::warn!("upload rejected: nothing exported yet");
            ScanError::ArtifactMissing {
                path: Default::default(),
            }
        })?;
        self.upload(&artifact, destination).await
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn scene(&self) -> Option<Arc<Scene>> {
        self.session.scene()
    }

    pub fn last_artifact(&self) -> Option<Artifact> {
        self.orchestrator.last_artifact()
    }

    pub fn default_path(&self, format: ExportFormat) -> std::path::PathBuf {
        self.orchestrator.default_path(format)
    }

    pub fn status(&self) -> ScannerStatus {
        ScannerStatus {
            state: self.session.state(),
            scene: self.session.scene().map(|s| s.summary()),
            export_job: self.orchestrator.current_job(),
            last_artifact: self.orchestrator.last_artifact(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::harness::{FakeEngine, RecordingTransport};

    fn scanner(dir: &tempfile::TempDir) -> Scanner {
        Scanner::new(
            Arc::new(FakeEngine::new(fixtures::two_triangle_scene())),
            Arc::new(RecordingTransport::new()),
            ScannerSettings::in_dir(dir.path()),
        )
    }

    #[tokio::test]
    async fn test_status_follows_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(&dir);
        assert_eq!(scanner.status().state, SessionState::Idle);
        assert!(scanner.status().scene.is_none());

        scanner.start_scan().await.unwrap();
        scanner.stop_scan().await.unwrap();
        let artifact = scanner.export(ExportFormat::TextMesh).await.unwrap();

        let status = scanner.status();
        assert_eq!(status.state, SessionState::Captured);
        assert_eq!(status.scene.unwrap().triangle_count, 2);
        assert_eq!(status.last_artifact, Some(artifact));
    }

    #[tokio::test]
    async fn test_upload_latest_without_export() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(&dir);
        let err = scanner.upload_latest("https://example/ingest").await.unwrap_err();
        assert_eq!(err.kind(), "artifact_missing");
    }

    #[tokio::test]
    async fn test_upload_latest() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(&dir);
        scanner.start_scan().await.unwrap();
        scanner.stop_scan().await.unwrap();
        scanner.export(ExportFormat::FacetFormat).await.unwrap();
        let receipt = scanner.upload_latest("https://example/ingest").await.unwrap();
        assert_eq!(receipt.destination, "https://example/ingest");
    }

    #[tokio::test]
    async fn test_status_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let json = serde_json::to_value(scanner(&dir).status()).unwrap();
        assert_eq!(json["state"], "idle");
        assert!(json["scene"].is_null());
    }
}
