//! Capture session state machine.
//!
//! ```text
//!   Idle ──start──▶ Scanning ──stop──▶ Captured
//!    ▲                 │                 │  │
//!    └── no geometry ──┘                 │  └─stop─▶ same scene
//!                      ▲                 │
//!                      └─────start───────┘ (previous scene dropped)
//! ```
//!
//! Start and stop may suspend on the engine. Only one of them may be in
//! flight at a time; a second call while one is outstanding is rejected with
//! [`ScanError::OperationInProgress`].

use std::sync::{Arc, Mutex, MutexGuard};

use shared::{Scene, ScanEvent, SessionState};

use crate::engine::ReconstructionEngine;
use crate::error::{EngineError, ScanError, ScanResult};
use crate::events::EventBus;

#[derive(Clone)]
enum Phase {
    Idle,
    Scanning,
    Captured(Arc<Scene>),
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Scanning => SessionState::Scanning,
            Phase::Captured(_) => SessionState::Captured,
        }
    }
}

/// The one capture session of a scanner
pub struct CaptureSession {
    engine: Arc<dyn ReconstructionEngine>,
    phase: Mutex<Phase>,
    /// Held for the whole of a start/stop call, engine awaits included
    transition: tokio::sync::Mutex<()>,
    events: EventBus,
}

impl CaptureSession {
    pub fn new(engine: Arc<dyn ReconstructionEngine>, events: EventBus) -> Self {
        Self {
            engine,
            phase: Mutex::new(Phase::Idle),
            transition: tokio::sync::Mutex::new(()),
            events,
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, next: Phase) {
        let mut phase = self.phase();
        tracing::info!("Session {:?} -> {:?}", phase.state(), next.state());
        *phase = next;
    }

    pub fn state(&self) -> SessionState {
        self.phase().state()
    }

    /// Captured scene, present only in the Captured state
    pub fn scene(&self) -> Option<Arc<Scene>> {
        match &*self.phase() {
            Phase::Captured(scene) => Some(Arc::clone(scene)),
            _ => None,
        }
    }

    /// Begin accumulating geometry.
    ///
    /// From Captured the previous scene is discarded once the engine has
    /// started. Calling this while already scanning does nothing.
    pub async fn start_scan(&self) -> ScanResult<()> {
        let _guard = self.transition.try_lock().map_err(|_| {
            tracing::warn!("start_scan rejected: operation in progress");
            ScanError::OperationInProgress
        })?;

        let current = self.phase().clone();
        if matches!(current, Phase::Scanning) {
            tracing::debug!("start_scan: already scanning");
            return Ok(());
        }

        if !self.engine.supported() {
            tracing::warn!("start_scan: reconstruction unsupported on this device");
            return Err(EngineError::Unavailable.into());
        }

        if let Err(e) = self.engine.begin().await {
            tracing::error!("Engine failed to begin: {e}");
            return Err(match e {
                EngineError::NoGeometry => ScanError::EngineUnavailable(e.to_string()),
                other => other.into(),
            });
        }

        self.set_phase(Phase::Scanning);
        self.events.emit(ScanEvent::ScanStarted);
        Ok(())
    }

    /// Pause the engine and freeze its scene.
    ///
    /// Repeated calls without a new start return the same scene without
    /// touching the engine again.
    pub async fn stop_scan(&self) -> ScanResult<Arc<Scene>> {
        let _guard = self.transition.try_lock().map_err(|_| {
            tracing::warn!("stop_scan rejected: operation in progress");
            ScanError::OperationInProgress
        })?;

        match self.phase().clone() {
            Phase::Captured(scene) => return Ok(scene),
            Phase::Idle => {
                tracing::warn!("stop_scan: no scan running");
                return Err(ScanError::NoScene);
            }
            Phase::Scanning => {}
        }

        let scene = match self.engine.pause().await {
            Ok(scene) if scene.vertex_count() > 0 => scene,
            Ok(_) | Err(EngineError::NoGeometry) => {
                tracing::warn!("stop_scan: engine returned no geometry");
                self.set_phase(Phase::Idle);
                return Err(ScanError::NoGeometry);
            }
            Err(e) => {
                tracing::error!("Engine failed to pause: {e}");
                self.set_phase(Phase::Idle);
                return Err(e.into());
            }
        };

        let summary = scene.summary();
        tracing::info!(
            "Captured {} nodes, {} vertices, {} triangles",
            summary.node_count,
            summary.vertex_count,
            summary.triangle_count
        );

        let scene = Arc::new(scene);
        self.set_phase(Phase::Captured(Arc::clone(&scene)));
        self.events.emit(ScanEvent::ScanStopped { summary });
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::harness::FakeEngine;

    fn session_with(engine: FakeEngine) -> (CaptureSession, Arc<FakeEngine>) {
        let engine = Arc::new(engine);
        let session = CaptureSession::new(engine.clone(), EventBus::new());
        (session, engine)
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let (session, _) = session_with(FakeEngine::new(fixtures::two_triangle_scene()));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.scene().is_none());
    }

    #[tokio::test]
    async fn test_start_stop_captures() {
        let (session, engine) = session_with(FakeEngine::new(fixtures::two_triangle_scene()));
        session.start_scan().await.unwrap();
        assert_eq!(session.state(), SessionState::Scanning);

        let scene = session.stop_scan().await.unwrap();
        assert_eq!(session.state(), SessionState::Captured);
        assert_eq!(scene.triangle_count(), 2);
        assert_eq!(engine.begin_calls(), 1);
        assert_eq!(engine.pause_calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_twice_returns_same_scene() {
        let (session, engine) = session_with(FakeEngine::new(fixtures::two_triangle_scene()));
        session.start_scan().await.unwrap();
        let first = session.stop_scan().await.unwrap();
        let second = session.stop_scan().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.pause_calls(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_engine_stays_idle() {
        let (session, engine) = session_with(FakeEngine::unsupported());
        let err = session.start_scan().await.unwrap_err();
        assert!(matches!(err, ScanError::EngineUnavailable(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(engine.begin_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_geometry_returns_to_idle() {
        let (session, _) = session_with(FakeEngine::new(Scene::empty()));
        session.start_scan().await.unwrap();
        assert_eq!(session.stop_scan().await.unwrap_err(), ScanError::NoGeometry);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.scene().is_none());
    }

    #[tokio::test]
    async fn test_nodes_without_vertices_count_as_no_geometry() {
        let (session, _) = session_with(FakeEngine::new(fixtures::scene_without_vertices()));
        session.start_scan().await.unwrap();
        assert_eq!(session.stop_scan().await.unwrap_err(), ScanError::NoGeometry);
    }

    #[tokio::test]
    async fn test_pause_failure_returns_to_idle() {
        let engine = FakeEngine::new(fixtures::two_triangle_scene())
            .failing_pause(EngineError::Other("tracking lost".into()));
        let (session, _) = session_with(engine);
        session.start_scan().await.unwrap();

        let err = session.stop_scan().await.unwrap_err();
        assert_eq!(err, ScanError::EngineUnavailable("tracking lost".into()));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stop_while_idle() {
        let (session, engine) = session_with(FakeEngine::new(fixtures::two_triangle_scene()));
        assert_eq!(session.stop_scan().await.unwrap_err(), ScanError::NoScene);
        assert_eq!(engine.pause_calls(), 0);
    }

    #[tokio::test]
    async fn test_restart_discards_previous_scene() {
        let (session, _) = session_with(FakeEngine::new(fixtures::two_triangle_scene()));
        session.start_scan().await.unwrap();
        session.stop_scan().await.unwrap();
        assert!(session.scene().is_some());

        session.start_scan().await.unwrap();
        assert_eq!(session.state(), SessionState::Scanning);
        assert!(session.scene().is_none());
    }

    #[tokio::test]
    async fn test_start_while_scanning_is_noop() {
        let (session, engine) = session_with(FakeEngine::new(fixtures::two_triangle_scene()));
        session.start_scan().await.unwrap();
        session.start_scan().await.unwrap();
        assert_eq!(engine.begin_calls(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_calls_rejected() {
        let engine = FakeEngine::new(fixtures::two_triangle_scene()).with_gate();
        let (session, engine) = session_with(engine);
        let session = Arc::new(session);

        let pending = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.start_scan().await })
        };
        engine.wait_until_blocked().await;

        assert_eq!(session.stop_scan().await.unwrap_err(), ScanError::OperationInProgress);
        assert_eq!(session.start_scan().await.unwrap_err(), ScanError::OperationInProgress);

        engine.release();
        pending.await.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let engine = Arc::new(FakeEngine::new(fixtures::two_triangle_scene()));
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let session = CaptureSession::new(engine, events);

        session.start_scan().await.unwrap();
        session.stop_scan().await.unwrap();
        session.stop_scan().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), ScanEvent::ScanStarted);
        match rx.recv().await.unwrap() {
            ScanEvent::ScanStopped { summary } => assert_eq!(summary.triangle_count, 2),
            other => panic!("Expected ScanStopped, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
