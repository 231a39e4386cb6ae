//! Export orchestration.
//!
//! Turns the session's captured scene into an artifact on disk. Only one
//! export runs at a time per orchestrator; a request made while another is
//! running is rejected with [`ScanError::ExportBusy`], never queued.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use shared::{Artifact, ExportFormat, ExportJob, ExportJobState, ScanEvent};

use crate::error::{ExportError, ScanError, ScanResult};
use crate::events::EventBus;
use crate::export::ExportPipeline;
use crate::session::CaptureSession;
use crate::settings::ScannerSettings;

/// Runs exports of the captured scene and remembers the latest artifact
pub struct ExportOrchestrator {
    session: Arc<CaptureSession>,
    pipeline: ExportPipeline,
    settings: ScannerSettings,
    /// Held by the export task until its outcome is recorded
    slot: Arc<tokio::sync::Mutex<()>>,
    ledger: Arc<ExportLedger>,
}

/// Job state, latest artifact and event fan-out shared with export tasks
struct ExportLedger {
    job: Mutex<Option<ExportJob>>,
    last_artifact: Mutex<Option<Artifact>>,
    events: EventBus,
}

impl ExportLedger {
    fn set_job(&self, job: ExportJob) {
        *lock(&self.job) = Some(job);
    }

    fn set_job_state(&self, format: ExportFormat, state: ExportJobState) {
        self.set_job(ExportJob { format, state });
    }

    /// Move the job to its terminal state and announce it
    fn record(
        &self,
        format: ExportFormat,
        outcome: Result<Artifact, ExportError>,
    ) -> Result<Artifact, ExportError> {
        match outcome {
            Ok(artifact) => {
                tracing::info!("Export {format} succeeded: {} bytes", artifact.byte_len);
                self.set_job_state(
                    format,
                    ExportJobState::Succeeded {
                        artifact: artifact.clone(),
                    },
                );
                *lock(&self.last_artifact) = Some(artifact.clone());
                self.events.emit(ScanEvent::ExportSucceeded {
                    artifact: artifact.clone(),
                });
                Ok(artifact)
            }
            Err(e) => {
                tracing::error!("Export {format} failed: {e}");
                let reason = e.to_string();
                self.set_job_state(
                    format,
                    ExportJobState::Failed {
                        reason: reason.clone(),
                    },
                );
                self.events.emit(ScanEvent::ExportFailed { format, reason });
                Err(e)
            }
        }
    }
}

impl ExportOrchestrator {
    pub fn new(
        session: Arc<CaptureSession>,
        pipeline: ExportPipeline,
        settings: ScannerSettings,
        events: EventBus,
    ) -> Self {
        Self {
            session,
            pipeline,
            settings,
            slot: Arc::new(tokio::sync::Mutex::new(())),
            ledger: Arc::new(ExportLedger {
                job: Mutex::new(None),
                last_artifact: Mutex::new(None),
                events,
            }),
        }
    }

    /// Where `export` writes a given format
    pub fn default_path(&self, format: ExportFormat) -> PathBuf {
        self.settings.default_artifact_path(format)
    }

    /// Export to the default artifact path
    pub async fn export(&self, format: ExportFormat) -> ScanResult<Artifact> {
        let path = self.default_path(format);
        self.export_to(format, &path).await
    }

    /// Export the captured scene to `path`
    ///
    /// The encode runs in its own task, so the job reaches a terminal state
    /// and the slot is freed even if the caller stops waiting.
    pub async fn export_to(&self, format: ExportFormat, path: &Path) -> ScanResult<Artifact> {
        let Some(scene) = self.session.scene() else {
            tracing::warn!("export({format}) rejected: no captured scene");
            return Err(ScanError::NoScene);
        };

        let slot = Arc::clone(&self.slot).try_lock_owned().map_err(|_| {
            tracing::warn!("export({format}) rejected: another export is running");
            ScanError::ExportBusy
        })?;

        self.ledger.set_job(ExportJob::new(format));
        self.ledger.events.emit(ScanEvent::ExportStarted { format });
        self.ledger.set_job_state(format, ExportJobState::Running);
        tracing::info!("Exporting {format} to {}", path.display());

        let pipeline = self.pipeline.clone();
        let target = path.to_path_buf();
        let ledger = Arc::clone(&self.ledger);
        let task = tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || pipeline.encode(&scene, format, &target))
                .await
                .unwrap_or_else(|e| Err(ExportError::encoding(format, format!("encoder task failed: {e}"))));
            let outcome = ledger.record(format, outcome);
            drop(slot);
            outcome
        });

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = ExportError::encoding(format, format!("export task failed: {e}"));
                self.ledger.record(format, Err(err))
            }
        };
        outcome.map_err(ScanError::from)
    }

    /// The most recent export request, if any
    pub fn current_job(&self) -> Option<ExportJob> {
        lock(&self.ledger.job).clone()
    }

    /// The most recent successful artifact
    pub fn last_artifact(&self) -> Option<Artifact> {
        lock(&self.ledger.last_artifact).clone()
    }

    /// True while an export task holds the slot
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
