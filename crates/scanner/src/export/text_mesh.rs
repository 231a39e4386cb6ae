//! Plain-text mesh (OBJ) encoder and reader.
//!
//! One block per node:
//!
//! ```text
//! o <node id>
//! v x y z          # positions
//! vn x y z         # normals, only when the node has them
//! f a b c          # or f a//a b//b c//c with normals
//! ```
//!
//! Face indices are 1-based and global across the file, as OBJ requires.

use std::collections::HashMap;
use std::fmt::Write;

use shared::{ExportFormat, MeshError, MeshNode, Scene};
use thiserror::Error;

use crate::error::ExportError;

/// Render all nodes as consecutive object blocks
pub fn render(scene: &Scene) -> Result<String, ExportError> {
    if scene.vertex_count() == 0 {
        return Err(ExportError::empty_scene(ExportFormat::TextMesh));
    }

    let summary = scene.summary();
    let mut out = String::new();
    let _ = writeln!(out, "# scan");
    let _ = writeln!(
        out,
        "# nodes {} vertices {} triangles {}",
        summary.node_count, summary.vertex_count, summary.triangle_count
    );

    // 1-based offset of the current node's first vertex / normal
    let mut v_base = 1usize;
    let mut n_base = 1usize;

    for node in scene.nodes() {
        if node.vertex_count() == 0 {
            continue;
        }

        let _ = writeln!(out, "o {}", object_name(node.id()));
        for [x, y, z] in node.positions() {
            let _ = writeln!(out, "v {x} {y} {z}");
        }
        for [x, y, z] in node.normals() {
            let _ = writeln!(out, "vn {x} {y} {z}");
        }

        for tri in node.triangles() {
            let [a, b, c] = tri.map(|i| i as usize + v_base);
            if node.has_normals() {
                let [na, nb, nc] = tri.map(|i| i as usize + n_base);
                let _ = writeln!(out, "f {a}//{na} {b}//{nb} {c}//{nc}");
            } else {
                let _ = writeln!(out, "f {a} {b} {c}");
            }
        }

        v_base += node.vertex_count();
        n_base += node.normals().len();
    }

    Ok(out)
}

/// Node id as a one-line object name.
///
/// `#` and control characters become `_` and whitespace runs collapse to a
/// single space, so the name can never start a new record or a comment.
fn object_name(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c == '#' || c.is_control() { '_' } else { c })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Errors while reading text-mesh input
#[derive(Debug, Error)]
pub enum TextMeshError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Mesh(#[from] MeshError),
}

impl TextMeshError {
    fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Normal reference seen for one vertex of a block
#[derive(Clone, Copy, PartialEq)]
enum NormalRef {
    Unseen,
    Index(usize),
    Missing,
}

/// Object block being collected
#[derive(Default)]
struct PendingNode {
    name: Option<String>,
    /// First global normal index of this block
    normal_start: usize,
    /// Local index of each vertex declared by a `v` line in this block
    declared: Vec<u32>,
    /// Global vertex index -> local index
    remap: HashMap<usize, u32>,
    positions: Vec<[f64; 3]>,
    normal_refs: Vec<NormalRef>,
    triangles: Vec<[u32; 3]>,
}

impl PendingNode {
    fn local(&mut self, global: usize, vertices: &[[f64; 3]]) -> u32 {
        if let Some(&local) = self.remap.get(&global) {
            return local;
        }
        let local = self.positions.len() as u32;
        self.remap.insert(global, local);
        self.positions.push(vertices[global]);
        self.normal_refs.push(NormalRef::Unseen);
        local
    }

    fn declare(&mut self, global: usize, vertices: &[[f64; 3]]) {
        let local = self.local(global, vertices);
        self.declared.push(local);
    }

    fn corner(&mut self, global: usize, normal: Option<usize>, vertices: &[[f64; 3]]) -> u32 {
        let local = self.local(global, vertices);
        let slot = &mut self.normal_refs[local as usize];
        *slot = match (*slot, normal) {
            (NormalRef::Unseen, Some(n)) => NormalRef::Index(n),
            (NormalRef::Index(prev), Some(n)) if prev == n => NormalRef::Index(n),
            _ => NormalRef::Missing,
        };
        local
    }

    fn finish(self, normals: &[[f64; 3]], index: usize) -> Result<Option<MeshNode>, MeshError> {
        if self.positions.is_empty() {
            return Ok(None);
        }
        let node_normals = self.resolve_normals(normals).unwrap_or_default();
        let id = self.name.unwrap_or_else(|| format!("node{index}"));
        MeshNode::new(id, self.positions, node_normals, self.triangles).map(Some)
    }

    /// One normal per vertex, or `None` if any vertex lacks a single one.
    ///
    /// Vertices no face references take the block's `vn` records in
    /// declaration order, provided the block has one per declared vertex.
    fn resolve_normals(&self, normals: &[[f64; 3]]) -> Option<Vec<[f64; 3]>> {
        let block = normals.get(self.normal_start..).unwrap_or_default();
        let mut in_order = vec![None; self.positions.len()];
        if block.len() == self.declared.len() {
            for (&local, n) in self.declared.iter().zip(block) {
                in_order[local as usize] = Some(*n);
            }
        }
        self.normal_refs
            .iter()
            .zip(in_order)
            .map(|(r, fallback)| match r {
                NormalRef::Index(i) => normals.get(*i).copied(),
                NormalRef::Unseen => fallback,
                NormalRef::Missing => None,
            })
            .collect()
    }
}

/// Parse text-mesh input back into a scene.
///
/// Understands `o`, `v`, `vn` and `f` records (with `a`, `a/b`, `a//c`,
/// `a/b/c` corners and negative relative indices); other records are
/// ignored. Vertices belong to the block they are declared in; faces that
/// reach into another block copy the vertex. Polygons are fan-triangulated.
/// A node keeps its normals only when every vertex resolves to a single one;
/// vertices without faces pair with the block's `vn` records in order.
pub fn parse(text: &str) -> Result<Scene, TextMeshError> {
    let mut vertices: Vec<[f64; 3]> = Vec::new();
    let mut normals: Vec<[f64; 3]> = Vec::new();
    let mut nodes: Vec<MeshNode> = Vec::new();
    let mut current = PendingNode::default();

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };

        match tag {
            "o" => {
                let name: Vec<&str> = parts.collect();
                let name = (!name.is_empty()).then(|| name.join(" "));
                if current.positions.is_empty() {
                    current.name = name.or(current.name);
                } else {
                    let done = std::mem::take(&mut current);
                    if let Some(node) = done.finish(&normals, nodes.len())? {
                        nodes.push(node);
                    }
                    current.name = name;
                    current.normal_start = normals.len();
                }
            }
            "v" => {
                vertices.push(parse_vec3(parts, line_no)?);
                current.declare(vertices.len() - 1, &vertices);
            }
            "vn" => normals.push(parse_vec3(parts, line_no)?),
            "f" => {
                let mut corners = Vec::with_capacity(4);
                for token in parts {
                    let (v, n) = parse_corner(token, vertices.len(), normals.len(), line_no)?;
                    corners.push(current.corner(v, n, &vertices));
                }
                if corners.len() < 3 {
                    return Err(TextMeshError::parse(line_no, "face needs at least 3 corners"));
                }
                for k in 1..corners.len() - 1 {
                    current.triangles.push([corners[0], corners[k], corners[k + 1]]);
                }
            }
            _ => {}
        }
    }

    if let Some(node) = current.finish(&normals, nodes.len())? {
        nodes.push(node);
    }

    Ok(Scene::new(nodes))
}

fn parse_vec3<'a>(
    mut parts: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<[f64; 3], TextMeshError> {
    let mut out = [0.0; 3];
    for slot in &mut out {
        let token = parts
            .next()
            .ok_or_else(|| TextMeshError::parse(line, "expected 3 coordinates"))?;
        *slot = token
            .parse()
            .map_err(|e| TextMeshError::parse(line, format!("bad number '{token}': {e}")))?;
    }
    Ok(out)
}

/// Resolve one `v[/vt][/vn]` corner to 0-based global indices
fn parse_corner(
    token: &str,
    vertex_count: usize,
    normal_count: usize,
    line: usize,
) -> Result<(usize, Option<usize>), TextMeshError> {
    let mut fields = token.split('/');
    let v = fields.next().unwrap_or("");
    let _texture = fields.next();
    let n = fields.next().filter(|s| !s.is_empty());

    let v = resolve_index(v, vertex_count, line)?;
    let n = n.map(|n| resolve_index(n, normal_count, line)).transpose()?;
    Ok((v, n))
}

fn resolve_index(token: &str, count: usize, line: usize) -> Result<usize, TextMeshError> {
    let value: i64 = token
        .parse()
        .map_err(|e| TextMeshError::parse(line, format!("bad index '{token}': {e}")))?;
    let resolved = match value {
        v if v > 0 => v - 1,
        v if v < 0 => count as i64 + v,
        _ => return Err(TextMeshError::parse(line, "index 0 is not valid")),
    };
    if resolved < 0 || resolved as usize >= count {
        return Err(TextMeshError::parse(
            line,
            format!("index {value} out of range ({count} defined)"),
        ));
    }
    Ok(resolved as usize)
}
