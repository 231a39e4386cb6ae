//! Reconstruction engine capability.
//!
//! The engine turns sensor data into mesh geometry; the scanner only asks it
//! to start accumulating and, later, for its current best scene.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use shared::Scene;

use crate::error::EngineError;
use crate::export::text_mesh;

/// Source of reconstructed geometry
#[async_trait]
pub trait ReconstructionEngine: Send + Sync {
    /// Whether scene reconstruction is available on this device
    fn supported(&self) -> bool;

    /// Start (or restart) accumulating geometry
    async fn begin(&self) -> Result<(), EngineError>;

    /// Pause accumulation and return the current best scene.
    ///
    /// Must be safe to call again without an intervening `begin`.
    async fn pause(&self) -> Result<Scene, EngineError>;
}

/// Engine that replays a previously captured scene.
///
/// Used by the CLI and the HTTP bridge when no sensor is attached.
pub struct ReplayEngine {
    scene: Scene,
    running: Mutex<bool>,
}

impl ReplayEngine {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            running: Mutex::new(false),
        }
    }

    /// Load the scene to replay from a text-mesh (`.obj`) or JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let scene = load_scene_file(path)
            .map_err(|e| EngineError::Other(format!("{}: {e}", path.display())))?;
        tracing::info!(
            "Replay engine loaded {} ({} nodes, {} triangles)",
            path.display(),
            scene.node_count(),
            scene.triangle_count()
        );
        Ok(Self::new(scene))
    }

    /// True between `begin` and `pause`
    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| *r).unwrap_or(false)
    }
}

fn load_scene_file(path: &Path) -> Result<Scene, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&text).map_err(|e| format!("JSON parse error: {e}"))
    } else {
        text_mesh::parse(&text).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ReconstructionEngine for ReplayEngine {
    fn supported(&self) -> bool {
        true
    }

    async fn begin(&self) -> Result<(), EngineError> {
        if let Ok(mut running) = self.running.lock() {
            *running = true;
        }
        Ok(())
    }

    async fn pause(&self) -> Result<Scene, EngineError> {
        if let Ok(mut running) = self.running.lock() {
            *running = false;
        }
        if self.scene.is_empty() {
            return Err(EngineError::NoGeometry);
        }
        Ok(self.scene.clone())
    }
}

/// Engine for devices without scene reconstruction
#[derive(Debug, Default)]
pub struct UnsupportedEngine;

#[async_trait]
impl ReconstructionEngine for UnsupportedEngine {
    fn supported(&self) -> bool {
        false
    }

    async fn begin(&self) -> Result<(), EngineError> {
        Err(EngineError::Unavailable)
    }

    async fn pause(&self) -> Result<Scene, EngineError> {
        Err(EngineError::NoGeometry)
    }
}

/// Where the replay scene for the bridges comes from
pub fn replay_source_from_env() -> Option<PathBuf> {
    std::env::var_os("SCANNER_REPLAY_SCENE").map(PathBuf::from)
}
