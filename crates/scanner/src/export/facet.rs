//! ASCII facet-list (STL) encoder.
//!
//! ```text
//! solid scan
//!   facet normal nx ny nz
//!     outer loop
//!       vertex x y z
//!       vertex x y z
//!       vertex x y z
//!     endloop
//!   endfacet
//!   ...
//! endsolid scan
//! ```
//!
//! Facet normals are always recomputed from the triangle corners; the mesh's
//! stored per-vertex normals are never read. A degenerate triangle gets the
//! normal `0 0 0` and is still written.

use std::fmt::Write;

use glam::DVec3;
use shared::{ExportFormat, Scene};

use crate::error::ExportError;

/// Name written after `solid` / `endsolid`
pub const SOLID_NAME: &str = "scan";

/// Render every triangle of every node as one facet
pub fn render(scene: &Scene) -> Result<String, ExportError> {
    let triangle_count = scene.triangle_count();
    if triangle_count == 0 {
        return Err(ExportError::empty_scene(ExportFormat::FacetFormat));
    }

    // ~7 lines of ~40 chars per facet
    let mut out = String::with_capacity(32 + triangle_count * 280);
    let _ = writeln!(out, "solid {SOLID_NAME}");

    let mut degenerate = 0usize;
    for node in scene.nodes() {
        for t in 0..node.triangle_count() {
            let corners = node.triangle_positions(t);
            let normal = face_normal(&corners);
            if normal == DVec3::ZERO {
                degenerate += 1;
            }
            write_facet(&mut out, normal, &corners);
        }
    }

    let _ = writeln!(out, "endsolid {SOLID_NAME}");

    if degenerate > 0 {
        tracing::warn!("{degenerate} degenerate triangles written with zero normals");
    }
    tracing::debug!("Rendered {triangle_count} facets");
    Ok(out)
}

/// Unit normal of the triangle, zero when it has no area
pub fn face_normal(corners: &[[f64; 3]; 3]) -> DVec3 {
    let p0 = DVec3::from_array(corners[0]);
    let p1 = DVec3::from_array(corners[1]);
    let p2 = DVec3::from_array(corners[2]);

    let edge1 = p1 - p0;
    let edge2 = p2 - p0;
    // Adding +0.0 turns -0.0 into 0.0 so the text never shows "-0"
    edge1.cross(edge2).normalize_or_zero() + DVec3::ZERO
}

fn write_facet(out: &mut String, normal: DVec3, corners: &[[f64; 3]; 3]) {
    let _ = writeln!(out, "  facet normal {} {} {}", normal.x, normal.y, normal.z);
    out.push_str("    outer loop\n");
    for [x, y, z] in corners {
        let _ = writeln!(out, "      vertex {x} {y} {z}");
    }
    out.push_str("    endloop\n");
    out.push_str("  endfacet\n");
}
