//! Captured mesh geometry.
//!
//! A [`Scene`] is a frozen snapshot of what the reconstruction engine produced:
//! an ordered list of [`MeshNode`]s, each carrying its own vertex, normal and
//! triangle index buffers. Nodes are checked on construction, so every scene
//! handed to an encoder is already index-safe.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle of a mesh node
pub type NodeId = String;

/// Errors raised when node buffers break the mesh invariants
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeshError {
    #[error("node '{node}': triangle {triangle} references vertex {index}, but only {vertex_count} exist")]
    IndexOutOfRange {
        node: NodeId,
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("node '{node}': {normals} normals for {positions} positions")]
    NormalCountMismatch {
        node: NodeId,
        positions: usize,
        normals: usize,
    },
}

/// One mesh of a captured scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMeshNode")]
pub struct MeshNode {
    id: NodeId,
    positions: Vec<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    normals: Vec<[f64; 3]>,
    triangles: Vec<[u32; 3]>,
}

/// Unchecked wire form, validated into a [`MeshNode`]
#[derive(Deserialize)]
struct RawMeshNode {
    id: NodeId,
    positions: Vec<[f64; 3]>,
    #[serde(default)]
    normals: Vec<[f64; 3]>,
    triangles: Vec<[u32; 3]>,
}

impl TryFrom<RawMeshNode> for MeshNode {
    type Error = MeshError;

    fn try_from(raw: RawMeshNode) -> Result<Self, Self::Error> {
        MeshNode::new(raw.id, raw.positions, raw.normals, raw.triangles)
    }
}

impl MeshNode {
    /// Build a node, checking index range and normal count.
    ///
    /// `normals` must either be empty or match `positions` one-to-one.
    pub fn new(
        id: impl Into<NodeId>,
        positions: Vec<[f64; 3]>,
        normals: Vec<[f64; 3]>,
        triangles: Vec<[u32; 3]>,
    ) -> Result<Self, MeshError> {
        let id = id.into();

        if !normals.is_empty() && normals.len() != positions.len() {
            return Err(MeshError::NormalCountMismatch {
                node: id,
                positions: positions.len(),
                normals: normals.len(),
            });
        }

        let vertex_count = positions.len();
        for (t, tri) in triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(MeshError::IndexOutOfRange {
                    node: id,
                    triangle: t,
                    index,
                    vertex_count,
                });
            }
        }

        Ok(Self {
            id,
            positions,
            normals,
            triangles,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    /// Per-vertex normals, empty when the engine did not supply any
    pub fn normals(&self) -> &[[f64; 3]] {
        &self.normals
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    /// Corner positions of triangle `t`, in stored winding order
    pub fn triangle_positions(&self, t: usize) -> [[f64; 3]; 3] {
        let [a, b, c] = self.triangles[t];
        [
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        ]
    }
}

/// Frozen snapshot of reconstructed geometry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scene {
    nodes: Vec<MeshNode>,
}

impl Scene {
    pub fn new(nodes: Vec<MeshNode>) -> Self {
        Self { nodes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[MeshNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total vertex count across all nodes
    pub fn vertex_count(&self) -> usize {
        self.nodes.iter().map(MeshNode::vertex_count).sum()
    }

    /// Total triangle count across all nodes
    pub fn triangle_count(&self) -> usize {
        self.nodes.iter().map(MeshNode::triangle_count).sum()
    }

    /// True when the scene holds no nodes at all
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn summary(&self) -> SceneSummary {
        SceneSummary {
            node_count: self.node_count(),
            vertex_count: self.vertex_count(),
            triangle_count: self.triangle_count(),
        }
    }
}

/// Counts reported to the presentation layer when a scan stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SceneSummary {
    pub node_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
}
