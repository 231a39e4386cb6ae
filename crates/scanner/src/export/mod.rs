//! Mesh export pipeline.
//!
//! Three independent encoders turn a frozen [`Scene`] into bytes:
//!
//! | format | module | output |
//! |---|---|---|
//! | [`ExportFormat::Archive`] | [`archive`] | binary glTF container |
//! | [`ExportFormat::TextMesh`] | [`text_mesh`] | OBJ-style text listing |
//! | [`ExportFormat::FacetFormat`] | [`facet`] | ASCII STL facet list |
//!
//! Every encoder renders into memory first. The buffer is checked for
//! structural well-formedness and only then written to disk through a
//! temporary sibling file, so a failed export never leaves a partial file at
//! the artifact path.

pub mod archive;
pub mod facet;
pub mod text_mesh;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared::{Artifact, ExportFormat, Scene};

use crate::error::ExportError;
use crate::validation::ArtifactValidator;

pub use archive::{ArchiveWriter, GlbArchiveWriter};

/// Dispatches a scene to the encoder for a format
#[derive(Clone)]
pub struct ExportPipeline {
    archive: Arc<dyn ArchiveWriter>,
}

impl ExportPipeline {
    pub fn new(archive: Arc<dyn ArchiveWriter>) -> Self {
        Self { archive }
    }

    /// Render `scene` in `format` without touching the filesystem
    pub fn render(&self, scene: &Scene, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        match format {
            ExportFormat::Archive => self.archive.render(scene),
            ExportFormat::TextMesh => text_mesh::render(scene).map(String::into_bytes),
            ExportFormat::FacetFormat => facet::render(scene).map(String::into_bytes),
        }
    }

    /// Render `scene` and write it to `path`
    pub fn encode(
        &self,
        scene: &Scene,
        format: ExportFormat,
        path: &Path,
    ) -> Result<Artifact, ExportError> {
        let bytes = self.render(scene, format)?;
        write_artifact(format, &bytes, path)
    }
}

impl Default for ExportPipeline {
    fn default() -> Self {
        Self::new(Arc::new(GlbArchiveWriter))
    }
}

/// Check `bytes` and commit them to `path` as a finished artifact
fn write_artifact(
    format: ExportFormat,
    bytes: &[u8],
    path: &Path,
) -> Result<Artifact, ExportError> {
    let problems = ArtifactValidator::new(format, bytes).validate_all();
    if !problems.is_empty() {
        tracing::error!("{format} output failed structural checks: {:?}", problems);
        return Err(ExportError::encoding(format, problems.join("; ")));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ExportError::io(format, e))?;
    }

    let staging = staging_path(path);
    let written = std::fs::File::create(&staging)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| std::fs::rename(&staging, path));

    if let Err(e) = written {
        let _ = std::fs::remove_file(&staging);
        tracing::error!("Failed to write {}: {e}", path.display());
        return Err(ExportError::io(format, e));
    }

    let path = std::fs::canonicalize(path).map_err(|e| ExportError::io(format, e))?;
    tracing::info!("Wrote {} ({} bytes)", path.display(), bytes.len());

    Ok(Artifact {
        path,
        byte_len: bytes.len() as u64,
        format,
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.part", uuid::Uuid::new_v4()))
}
