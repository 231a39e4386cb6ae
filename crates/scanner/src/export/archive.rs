//! Scene archive encoder.
//!
//! The archive writer is a seam: the scanner only needs "serialize this scene,
//! every node's geometry included, into one container". The built-in writer
//! produces binary glTF (GLB).

use glam::DVec3;
use shared::{ExportFormat, MeshNode, Scene};

use crate::error::ExportError;

/// GLB magic number: "glTF"
pub const GLB_MAGIC: u32 = 0x46546C67;
/// GLB version 2
pub const GLB_VERSION: u32 = 2;
/// JSON chunk type
pub const CHUNK_TYPE_JSON: u32 = 0x4E4F534A;
/// BIN chunk type
pub const CHUNK_TYPE_BIN: u32 = 0x004E4942;

/// glTF component types
const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;

/// glTF buffer view targets
const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;

/// glTF primitive modes
const MODE_POINTS: u32 = 0;
const MODE_TRIANGLES: u32 = 4;

/// Writer for the archive container format
pub trait ArchiveWriter: Send + Sync {
    /// Serialize the whole scene into container bytes
    fn render(&self, scene: &Scene) -> Result<Vec<u8>, ExportError>;
}

/// Binary glTF writer
#[derive(Debug, Default, Clone, Copy)]
pub struct GlbArchiveWriter;

impl ArchiveWriter for GlbArchiveWriter {
    fn render(&self, scene: &Scene) -> Result<Vec<u8>, ExportError> {
        build_glb(scene)
    }
}

struct NodeMeta {
    name: String,
    vertex_count: usize,
    index_count: usize,
    pos_offset: usize,
    pos_length: usize,
    normals: Option<(usize, usize)>,
    indices: Option<(usize, usize)>,
    pos_min: [f32; 3],
    pos_max: [f32; 3],
}

/// Build a complete GLB file from a scene.
///
/// Each node with vertices becomes one glTF node/mesh. Nodes without
/// triangles are written as point primitives.
pub fn build_glb(scene: &Scene) -> Result<Vec<u8>, ExportError> {
    if scene.vertex_count() == 0 {
        return Err(ExportError::empty_scene(ExportFormat::Archive));
    }

    // ── Phase 1: Build binary buffer ─────────────────────────
    let mut bin_data: Vec<u8> = Vec::new();
    let mut metas: Vec<NodeMeta> = Vec::new();

    for node in scene.nodes() {
        if node.vertex_count() == 0 {
            continue;
        }

        let positions = narrow_positions(node)?;
        let mut pos_min = [f32::MAX; 3];
        let mut pos_max = [f32::MIN; 3];
        for p in &positions {
            for axis in 0..3 {
                pos_min[axis] = pos_min[axis].min(p[axis]);
                pos_max[axis] = pos_max[axis].max(p[axis]);
            }
        }

        // Positions
        let pos_offset = bin_data.len();
        for p in &positions {
            extend_f32s(&mut bin_data, p);
        }
        let pos_length = bin_data.len() - pos_offset;

        // Normals
        let normals = if node.has_normals() {
            let offset = bin_data.len();
            for n in node.normals() {
                let unit = DVec3::from_array(*n).normalize_or_zero().as_vec3();
                extend_f32s(&mut bin_data, &unit.to_array());
            }
            Some((offset, bin_data.len() - offset))
        } else {
            None
        };

        // Indices
        let indices = if node.triangle_count() > 0 {
            let offset = bin_data.len();
            for tri in node.triangles() {
                for i in tri {
                    bin_data.extend_from_slice(&i.to_le_bytes());
                }
            }
            Some((offset, bin_data.len() - offset))
        } else {
            None
        };

        // Keep every view 4-byte aligned (already true for f32/u32 data)
        while bin_data.len() % 4 != 0 {
            bin_data.push(0);
        }

        metas.push(NodeMeta {
            name: node.id().to_string(),
            vertex_count: node.vertex_count(),
            index_count: node.triangle_count() * 3,
            pos_offset,
            pos_length,
            normals,
            indices,
            pos_min,
            pos_max,
        });
    }

    // ── Phase 2: Build glTF JSON ─────────────────────────────
    let mut accessors = Vec::new();
    let mut buffer_views = Vec::new();
    let mut gltf_meshes = Vec::new();
    let mut nodes = Vec::new();
    let mut node_indices: Vec<usize> = Vec::new();

    for (i, meta) in metas.iter().enumerate() {
        // Positions
        let position_accessor = accessors.len();
        buffer_views.push(serde_json::json!({
            "buffer": 0,
            "byteOffset": meta.pos_offset,
            "byteLength": meta.pos_length,
            "target": ARRAY_BUFFER
        }));
        accessors.push(serde_json::json!({
            "bufferView": buffer_views.len() - 1,
            "byteOffset": 0,
            "componentType": FLOAT,
            "count": meta.vertex_count,
            "type": "VEC3",
            "min": meta.pos_min,
            "max": meta.pos_max
        }));

        let mut attributes = serde_json::json!({ "POSITION": position_accessor });

        // Normals
        if let Some((offset, length)) = meta.normals {
            buffer_views.push(serde_json::json!({
                "buffer": 0,
                "byteOffset": offset,
                "byteLength": length,
                "target": ARRAY_BUFFER
            }));
            attributes["NORMAL"] = serde_json::json!(accessors.len());
            accessors.push(serde_json::json!({
                "bufferView": buffer_views.len() - 1,
                "byteOffset": 0,
                "componentType": FLOAT,
                "count": meta.vertex_count,
                "type": "VEC3"
            }));
        }

        let mut primitive = serde_json::json!({
            "attributes": attributes,
            "mode": MODE_POINTS
        });

        // Indices
        if let Some((offset, length)) = meta.indices {
            buffer_views.push(serde_json::json!({
                "buffer": 0,
                "byteOffset": offset,
                "byteLength": length,
                "target": ELEMENT_ARRAY_BUFFER
            }));
            primitive["indices"] = serde_json::json!(accessors.len());
            primitive["mode"] = serde_json::json!(MODE_TRIANGLES);
            accessors.push(serde_json::json!({
                "bufferView": buffer_views.len() - 1,
                "byteOffset": 0,
                "componentType": UNSIGNED_INT,
                "count": meta.index_count,
                "type": "SCALAR"
            }));
        }

        gltf_meshes.push(serde_json::json!({
            "name": meta.name,
            "primitives": [primitive]
        }));

        nodes.push(serde_json::json!({
            "name": meta.name,
            "mesh": i
        }));

        node_indices.push(i);
    }

    let gltf_json = serde_json::json!({
        "asset": {
            "version": "2.0",
            "generator": concat!("scanner v", env!("CARGO_PKG_VERSION"))
        },
        "scene": 0,
        "scenes": [{
            "name": "Scan",
            "nodes": node_indices
        }],
        "nodes": nodes,
        "meshes": gltf_meshes,
        "accessors": accessors,
        "bufferViews": buffer_views,
        "buffers": [{
            "byteLength": bin_data.len()
        }]
    });

    let mut json_bytes = serde_json::to_vec(&gltf_json)
        .map_err(|e| ExportError::encoding(ExportFormat::Archive, e.to_string()))?;

    // GLB requires the JSON chunk padded to 4 bytes with spaces
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }

    // ── Phase 3: Assemble GLB ────────────────────────────────
    let total_length = 12 + 8 + json_bytes.len() + 8 + bin_data.len();
    let total_length_u32 = u32::try_from(total_length).map_err(|_| {
        ExportError::encoding(
            ExportFormat::Archive,
            format!("scene needs {total_length} bytes, over the 4 GiB container limit"),
        )
    })?;

    let mut glb = Vec::with_capacity(total_length);

    // Header
    glb.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
    glb.extend_from_slice(&total_length_u32.to_le_bytes());

    // JSON chunk
    glb.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_TYPE_JSON.to_le_bytes());
    glb.extend_from_slice(&json_bytes);

    // BIN chunk
    glb.extend_from_slice(&(bin_data.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_TYPE_BIN.to_le_bytes());
    glb.extend_from_slice(&bin_data);

    tracing::debug!("Built GLB: {} nodes, {} bytes", metas.len(), glb.len());
    Ok(glb)
}

/// Convert a node's positions to f32, failing when one cannot be represented
fn narrow_positions(node: &MeshNode) -> Result<Vec<[f32; 3]>, ExportError> {
    node.positions()
        .iter()
        .enumerate()
        .map(|(v, p)| {
            let fits = p.iter().all(|c| c.is_finite() && c.abs() <= f64::from(f32::MAX));
            if fits {
                Ok(p.map(|c| c as f32))
            } else {
                Err(ExportError::encoding(
                    ExportFormat::Archive,
                    format!("node '{}' vertex {v} {:?} does not fit in f32", node.id(), p),
                ))
            }
        })
        .collect()
}

fn extend_f32s(bytes: &mut Vec<u8>, data: &[f32; 3]) {
    for &f in data {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
}
