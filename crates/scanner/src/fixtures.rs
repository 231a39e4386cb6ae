//! Factory functions for creating test scenes.
//!
//! Provides small hand-checked meshes used by unit tests, integration tests
//! and the command protocol's replay mode.

use shared::{MeshNode, Scene};

// ── Node factories ──────────────────────────────────────────────

/// Build a node from trusted data. Panics on inconsistent input.
pub fn node(id: &str, positions: Vec<[f64; 3]>, normals: Vec<[f64; 3]>, triangles: Vec<[u32; 3]>) -> MeshNode {
    MeshNode::new(id, positions, normals, triangles)
        .unwrap_or_else(|e| panic!("fixture node '{id}' is inconsistent: {e}"))
}

/// Unit square in the XY plane split into two triangles, 4 vertices.
pub fn unit_square_node(id: &str) -> MeshNode {
    node(
        id,
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        vec![],
        vec![[0, 1, 2], [0, 2, 3]],
    )
}

/// Axis-aligned cube of edge `size` centered on the origin, outward winding.
pub fn cube_node(id: &str, size: f64) -> MeshNode {
    let h = size / 2.0;
    node(
        id,
        vec![
            [-h, -h, -h],
            [h, -h, -h],
            [h, h, -h],
            [-h, h, -h],
            [-h, -h, h],
            [h, -h, h],
            [h, h, h],
            [-h, h, h],
        ],
        vec![],
        vec![
            // bottom (-Z)
            [0, 2, 1],
            [0, 3, 2],
            // top (+Z)
            [4, 5, 6],
            [4, 6, 7],
            // front (-Y)
            [0, 1, 5],
            [0, 5, 4],
            // back (+Y)
            [3, 7, 6],
            [3, 6, 2],
            // left (-X)
            [0, 4, 7],
            [0, 7, 3],
            // right (+X)
            [1, 2, 6],
            [1, 6, 5],
        ],
    )
}

// ── Scene factories ─────────────────────────────────────────────

/// One triangle (0,0,0) (1,0,0) (0,1,0) facing +Z.
pub fn single_triangle_scene() -> Scene {
    Scene::new(vec![node(
        "triangle",
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![],
        vec![[0, 1, 2]],
    )])
}

/// One node, 4 vertices, 2 triangles.
pub fn two_triangle_scene() -> Scene {
    Scene::new(vec![unit_square_node("square")])
}

/// Two nodes: a 4-vertex floor square and a raised triangle.
pub fn multi_node_scene() -> Scene {
    Scene::new(vec![
        unit_square_node("floor"),
        node(
            "wall",
            vec![[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 0.0, 2.0]],
            vec![],
            vec![[0, 1, 2]],
        ),
    ])
}

/// One cube of edge `size` centered on the origin, 12 triangles.
pub fn cube_scene(size: f64) -> Scene {
    Scene::new(vec![cube_node("cube", size)])
}

/// Vertices without any triangles.
pub fn points_only_scene() -> Scene {
    Scene::new(vec![node(
        "points",
        vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5], [1.0, 0.0, 1.0]],
        vec![],
        vec![],
    )])
}

/// One zero-area triangle with every corner at (2,2,2).
pub fn degenerate_scene() -> Scene {
    Scene::new(vec![node(
        "degenerate",
        vec![[2.0, 2.0, 2.0]; 3],
        vec![],
        vec![[0, 1, 2]],
    )])
}

/// Triangle facing +Z whose stored normals point down.
pub fn triangle_with_wrong_normals() -> Scene {
    Scene::new(vec![node(
        "flipped",
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![[0.0, 0.0, -1.0]; 3],
        vec![[0, 1, 2]],
    )])
}

/// Triangle with a NaN coordinate.
pub fn non_finite_scene() -> Scene {
    Scene::new(vec![node(
        "broken",
        vec![[0.0, 0.0, 0.0], [f64::NAN, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![],
        vec![[0, 1, 2]],
    )])
}

/// Triangle with a coordinate that is finite but too large for f32.
pub fn huge_coordinate_scene() -> Scene {
    Scene::new(vec![node(
        "huge",
        vec![[0.0, 0.0, 0.0], [1.0e300, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![],
        vec![[0, 1, 2]],
    )])
}

/// Nodes exist but none has any vertex.
pub fn scene_without_vertices() -> Scene {
    Scene::new(vec![
        node("empty-a", vec![], vec![], vec![]),
        node("empty-b", vec![], vec![], vec![]),
    ])
}
