//! Headless test harness.
//!
//! Provides a scripted reconstruction engine, in-memory transports, a
//! blockable archive writer and a [`TestHarness`] that wires them into a
//! [`Scanner`] writing to a throwaway directory.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use async_trait::async_trait;
use reqwest::Url;
use shared::{Artifact, Scene};
use tokio::sync::{Notify, Semaphore};

use crate::engine::ReconstructionEngine;
use crate::error::{EngineError, ExportError, ScanResult, TransportError};
use crate::export::{ArchiveWriter, ExportPipeline, GlbArchiveWriter};
use crate::scanner::Scanner;
use crate::settings::ScannerSettings;
use crate::transfer::Transport;
use crate::validation::ArtifactValidator;

// ── Engine ──────────────────────────────────────────────────────

/// Engine that hands out a fixed scene and counts calls
pub struct FakeEngine {
    scene: Scene,
    supported: bool,
    pause_error: Option<EngineError>,
    gate: Option<Semaphore>,
    blocked: Notify,
    begin_calls: AtomicUsize,
    pause_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            supported: true,
            pause_error: None,
            gate: None,
            blocked: Notify::new(),
            begin_calls: AtomicUsize::new(0),
            pause_calls: AtomicUsize::new(0),
        }
    }

    /// Engine on a device without scene reconstruction
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(Scene::empty())
        }
    }

    /// `pause` fails with `err`
    pub fn failing_pause(mut self, err: EngineError) -> Self {
        self.pause_error = Some(err);
        self
    }

    /// Engine calls suspend until [`FakeEngine::release`]
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Resolves once an engine call is suspended on the gate
    pub async fn wait_until_blocked(&self) {
        self.blocked.notified().await;
    }

    /// Let suspended and future engine calls through
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn begin_calls(&self) -> usize {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub fn pause_calls(&self) -> usize {
        self.pause_calls.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            self.blocked.notify_one();
            if let Ok(permit) = gate.acquire().await {
                drop(permit);
            }
        }
    }
}

#[async_trait]
impl ReconstructionEngine for FakeEngine {
    fn supported(&self) -> bool {
        self.supported
    }

    async fn begin(&self) -> Result<(), EngineError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        Ok(())
    }

    async fn pause(&self) -> Result<Scene, EngineError> {
        self.pause_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        match &self.pause_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.scene.clone()),
        }
    }
}

// ── Archive writer ──────────────────────────────────────────────

/// GLB writer that blocks its worker thread until released
#[derive(Clone, Default)]
pub struct GatedArchiveWriter {
    open: Arc<(Mutex<bool>, Condvar)>,
    blocked: Arc<Notify>,
}

impl GatedArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a render is waiting on the gate
    pub async fn wait_until_blocked(&self) {
        self.blocked.notified().await;
    }

    pub fn release(&self) {
        let (open, cvar) = &*self.open;
        *open.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }
}

impl ArchiveWriter for GatedArchiveWriter {
    fn render(&self, scene: &Scene) -> Result<Vec<u8>, ExportError> {
        self.blocked.notify_one();
        let (open, cvar) = &*self.open;
        let mut guard = open.lock().unwrap_or_else(|e| e.into_inner());
        while !*guard {
            guard = cvar.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        drop(guard);
        GlbArchiveWriter.render(scene)
    }
}

// ── Transports ──────────────────────────────────────────────────

/// One request captured by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPayload {
    pub destination: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Transport that keeps every payload in memory
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentPayload>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentPayload> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        bytes: Vec<u8>,
        destination: &Url,
        content_type: &str,
    ) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentPayload {
                destination: destination.as_str().to_string(),
                content_type: content_type.to_string(),
                bytes,
            });
        Ok(())
    }
}

/// Transport whose every send fails with the same message
pub struct FailingTransport {
    message: String,
}

impl FailingTransport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, _: Vec<u8>, _: &Url, _: &str) -> Result<(), TransportError> {
        Err(TransportError(self.message.clone()))
    }
}

// ── Harness ─────────────────────────────────────────────────────

/// Scanner wired to fakes, exporting into a temporary directory
pub struct TestHarness {
    pub scanner: Scanner,
    pub engine: Arc<FakeEngine>,
    pub transport: Arc<RecordingTransport>,
    dir: tempfile::TempDir,
}

impl TestHarness {
    /// Harness whose engine yields the two-triangle square
    pub fn new() -> Self {
        Self::with_scene(crate::fixtures::two_triangle_scene())
    }

    pub fn with_scene(scene: Scene) -> Self {
        Self::with_engine(FakeEngine::new(scene))
    }

    pub fn with_engine(engine: FakeEngine) -> Self {
        Self::build(engine, ExportPipeline::default())
    }

    /// Harness whose archive exports go through `writer`
    pub fn with_archive_writer(scene: Scene, writer: Arc<dyn ArchiveWriter>) -> Self {
        Self::build(FakeEngine::new(scene), ExportPipeline::new(writer))
    }

    fn build(engine: FakeEngine, pipeline: ExportPipeline) -> Self {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("temp dir: {e}"));
        let engine = Arc::new(engine);
        let transport = Arc::new(RecordingTransport::new());
        let scanner = Scanner::with_pipeline(
            engine.clone(),
            transport.clone(),
            pipeline,
            ScannerSettings::in_dir(dir.path()),
        );
        Self {
            scanner,
            engine,
            transport,
            dir,
        }
    }

    /// Directory default-path exports land in
    pub fn export_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Start then stop, returning the frozen scene
    pub async fn capture(&self) -> ScanResult<Arc<Scene>> {
        self.scanner.start_scan().await?;
        self.scanner.stop_scan().await
    }

    /// Artifact contents as text
    pub fn read_text(&self, artifact: &Artifact) -> String {
        std::fs::read_to_string(&artifact.path).unwrap_or_default()
    }

    /// Structural problems in a written artifact
    pub fn validate(&self, artifact: &Artifact) -> Vec<String> {
        match std::fs::read(&artifact.path) {
            Ok(bytes) => ArtifactValidator::new(artifact.format, &bytes).validate_all(),
            Err(e) => vec![format!("cannot read {}: {e}", artifact.path.display())],
        }
    }

    /// Number of entries in the export directory
    pub fn file_count(&self) -> usize {
        std::fs::read_dir(self.dir.path()).map_or(0, |d| d.count())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
