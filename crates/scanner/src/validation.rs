//! Artifact validation utilities.
//!
//! `ArtifactValidator` checks rendered export bytes for structural
//! well-formedness before they are written out: container framing for
//! archives, index ranges for text meshes, facet layout for STL, and finite
//! numbers everywhere.

use shared::ExportFormat;

use crate::export::archive::{CHUNK_TYPE_BIN, CHUNK_TYPE_JSON, GLB_MAGIC, GLB_VERSION};

/// At most this many offending lines are quoted per problem
const MAX_QUOTED: usize = 5;

/// Validator for rendered export bytes.
pub struct ArtifactValidator<'a> {
    format: ExportFormat,
    bytes: &'a [u8],
}

impl<'a> ArtifactValidator<'a> {
    /// Create a new validator for bytes rendered in `format`.
    pub fn new(format: ExportFormat, bytes: &'a [u8]) -> Self {
        Self { format, bytes }
    }

    /// Run all checks for the format and return a list of problems.
    /// An empty list means the artifact is well formed.
    pub fn validate_all(&self) -> Vec<String> {
        if self.bytes.is_empty() {
            return vec!["Artifact is empty".to_string()];
        }
        match self.format {
            ExportFormat::Archive => self.validate_glb(),
            ExportFormat::TextMesh => match std::str::from_utf8(self.bytes) {
                Ok(text) => validate_obj(text),
                Err(e) => vec![format!("Text mesh is not UTF-8: {e}")],
            },
            ExportFormat::FacetFormat => match std::str::from_utf8(self.bytes) {
                Ok(text) => validate_stl(text),
                Err(e) => vec![format!("Facet list is not UTF-8: {e}")],
            },
        }
    }

    fn read_u32(&self, at: usize) -> Option<u32> {
        let word = self.bytes.get(at..at + 4)?;
        Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    fn validate_glb(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let (Some(magic), Some(version), Some(length)) =
            (self.read_u32(0), self.read_u32(4), self.read_u32(8))
        else {
            return vec![format!("GLB header truncated ({} bytes)", self.bytes.len())];
        };

        if magic != GLB_MAGIC {
            errors.push(format!("Bad GLB magic {magic:#010x}"));
        }
        if version != GLB_VERSION {
            errors.push(format!("Unsupported GLB version {version}"));
        }
        if length as usize != self.bytes.len() {
            errors.push(format!(
                "GLB header length {length} does not match {} bytes",
                self.bytes.len()
            ));
        }

        let (Some(json_len), Some(json_type)) = (self.read_u32(12), self.read_u32(16)) else {
            errors.push("GLB JSON chunk header missing".to_string());
            return errors;
        };
        if json_type != CHUNK_TYPE_JSON {
            errors.push(format!("First chunk type {json_type:#010x} is not JSON"));
        }
        let json_end = 20 + json_len as usize;
        let Some(json_bytes) = self.bytes.get(20..json_end) else {
            errors.push(format!("GLB JSON chunk overruns file ({json_len} bytes)"));
            return errors;
        };
        let json: serde_json::Value = match serde_json::from_slice(json_bytes) {
            Ok(json) => json,
            Err(e) => {
                errors.push(format!("GLB JSON chunk does not parse: {e}"));
                return errors;
            }
        };

        let declared_bin = json["buffers"][0]["byteLength"].as_u64().unwrap_or(0) as usize;
        match (self.read_u32(json_end), self.read_u32(json_end + 4)) {
            (Some(bin_len), Some(bin_type)) => {
                if bin_type != CHUNK_TYPE_BIN {
                    errors.push(format!("Second chunk type {bin_type:#010x} is not BIN"));
                }
                if (bin_len as usize) < declared_bin {
                    errors.push(format!(
                        "BIN chunk holds {bin_len} bytes, buffer declares {declared_bin}"
                    ));
                }
            }
            _ if declared_bin > 0 => errors.push("GLB BIN chunk missing".to_string()),
            _ => {}
        }

        let accessor_count = json["accessors"].as_array().map_or(0, Vec::len);
        let dangling: Vec<_> = json["meshes"]
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|m| m["primitives"].as_array().into_iter().flatten())
            .flat_map(|p| {
                let mut refs: Vec<u64> = p["attributes"]
                    .as_object()
                    .into_iter()
                    .flatten()
                    .filter_map(|(_, v)| v.as_u64())
                    .collect();
                refs.extend(p["indices"].as_u64());
                refs
            })
            .filter(|&a| a as usize >= accessor_count)
            .take(MAX_QUOTED)
            .collect();
        if !dangling.is_empty() {
            errors.push(format!(
                "Primitives reference missing accessors (accessor_count={accessor_count}): {dangling:?}"
            ));
        }

        errors
    }
}

/// Check an OBJ-style listing: finite coordinates and in-range face indices.
fn validate_obj(text: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut positions = 0usize;
    let mut normals = 0usize;
    let mut bad_numbers = Vec::new();
    let mut bad_faces = Vec::new();

    for (n, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some(tag @ ("v" | "vn")) => {
                let coords: Vec<_> = parts.map(str::parse::<f64>).collect();
                if coords.len() != 3 || !coords.iter().all(|c| matches!(c, Ok(c) if c.is_finite())) {
                    bad_numbers.push(n + 1);
                }
                if tag == "v" {
                    positions += 1;
                } else {
                    normals += 1;
                }
            }
            Some("f") => {
                let refs: Vec<&str> = parts.collect();
                let in_range = refs.len() >= 3
                    && refs.iter().all(|r| {
                        let mut fields = r.split('/');
                        let v_ok = fields
                            .next()
                            .and_then(|v| v.parse::<usize>().ok())
                            .is_some_and(|v| v >= 1 && v <= positions);
                        let n_ok = match fields.nth(1) {
                            Some(vn) => vn.parse::<usize>().is_ok_and(|vn| vn >= 1 && vn <= normals),
                            None => true,
                        };
                        v_ok && n_ok
                    });
                if !in_range {
                    bad_faces.push(n + 1);
                }
            }
            _ => {}
        }
    }

    if !bad_numbers.is_empty() {
        errors.push(format!(
            "Non-finite or malformed coordinates on lines {:?}",
            &bad_numbers[..bad_numbers.len().min(MAX_QUOTED)]
        ));
    }
    if !bad_faces.is_empty() {
        errors.push(format!(
            "Face indices out of range (positions={positions}, normals={normals}) on lines {:?}",
            &bad_faces[..bad_faces.len().min(MAX_QUOTED)]
        ));
    }
    errors
}

/// Check an ASCII STL listing: solid framing, facet layout, finite numbers.
fn validate_stl(text: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    if !lines.first().is_some_and(|l| l.starts_with("solid")) {
        errors.push("Facet list does not start with 'solid'".to_string());
    }
    if !lines.last().is_some_and(|l| l.starts_with("endsolid")) {
        errors.push("Facet list does not end with 'endsolid'".to_string());
    }

    let body = lines.get(1..lines.len().saturating_sub(1)).unwrap_or(&[]);
    if body.len() % 7 != 0 {
        errors.push(format!("Facet body has {} lines, not a multiple of 7", body.len()));
        return errors;
    }

    let mut bad_numbers = Vec::new();
    let mut bad_layout = Vec::new();
    for (f, facet) in body.chunks(7).enumerate() {
        let layout_ok = facet[0].starts_with("facet normal")
            && facet[1] == "outer loop"
            && facet[2..5].iter().all(|l| l.starts_with("vertex"))
            && facet[5] == "endloop"
            && facet[6] == "endfacet";
        if !layout_ok {
            bad_layout.push(f);
            continue;
        }

        let numbers_ok = std::iter::once(facet[0].trim_start_matches("facet normal"))
            .chain(facet[2..5].iter().map(|l| l.trim_start_matches("vertex")))
            .all(|fields| {
                let values: Vec<_> = fields.split_whitespace().map(str::parse::<f64>).collect();
                values.len() == 3 && values.iter().all(|v| matches!(v, Ok(v) if v.is_finite()))
            });
        if !numbers_ok {
            bad_numbers.push(f);
        }
    }

    if !bad_layout.is_empty() {
        errors.push(format!(
            "Malformed facets {:?}",
            &bad_layout[..bad_layout.len().min(MAX_QUOTED)]
        ));
    }
    if !bad_numbers.is_empty() {
        errors.push(format!(
            "Non-finite or malformed numbers in facets {:?}",
            &bad_numbers[..bad_numbers.len().min(MAX_QUOTED)]
        ));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{archive, facet, text_mesh};
    use crate::fixtures;

    const TRIANGLE_STL: &str = "solid scan
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid scan
";

    fn problems(format: ExportFormat, bytes: &[u8]) -> Vec<String> {
        ArtifactValidator::new(format, bytes).validate_all()
    }

    #[test]
    fn test_rendered_outputs_are_valid() {
        let scene = fixtures::multi_node_scene();
        let glb = archive::build_glb(&scene).unwrap();
        let obj = text_mesh::render(&scene).unwrap();
        let stl = facet::render(&scene).unwrap();

        let errors = problems(ExportFormat::Archive, &glb);
        assert!(errors.is_empty(), "Expected no errors, got: {:?}", errors);
        let errors = problems(ExportFormat::TextMesh, obj.as_bytes());
        assert!(errors.is_empty(), "Expected no errors, got: {:?}", errors);
        let errors = problems(ExportFormat::FacetFormat, stl.as_bytes());
        assert!(errors.is_empty(), "Expected no errors, got: {:?}", errors);
    }

    #[test]
    fn test_empty_bytes() {
        for &format in ExportFormat::all() {
            assert_eq!(problems(format, b""), vec!["Artifact is empty".to_string()]);
        }
    }

    #[test]
    fn test_stl_ok() {
        assert!(problems(ExportFormat::FacetFormat, TRIANGLE_STL.as_bytes()).is_empty());
    }

    #[test]
    fn test_stl_missing_trailer() {
        let text = TRIANGLE_STL.replace("endsolid scan\n", "");
        let errors = problems(ExportFormat::FacetFormat, text.as_bytes());
        assert!(errors.iter().any(|e| e.contains("endsolid")));
    }

    #[test]
    fn test_stl_missing_vertex() {
        let text = TRIANGLE_STL.replace("      vertex 0 1 0\n", "");
        let errors = problems(ExportFormat::FacetFormat, text.as_bytes());
        assert!(errors.iter().any(|e| e.contains("multiple of 7")));
    }

    #[test]
    fn test_stl_non_finite() {
        let text = TRIANGLE_STL.replace("vertex 1 0 0", "vertex NaN 0 0");
        let errors = problems(ExportFormat::FacetFormat, text.as_bytes());
        assert!(errors.iter().any(|e| e.contains("Non-finite")));

        let text = TRIANGLE_STL.replace("facet normal 0 0 1", "facet normal inf 0 0");
        assert!(!problems(ExportFormat::FacetFormat, text.as_bytes()).is_empty());
    }

    #[test]
    fn test_obj_ok() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n";
        assert!(problems(ExportFormat::TextMesh, text.as_bytes()).is_empty());
    }

    #[test]
    fn test_obj_index_out_of_range() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n";
        let errors = problems(ExportFormat::TextMesh, text.as_bytes());
        assert!(errors.iter().any(|e| e.contains("out of range")));

        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1//1 2//1 3//1\n";
        let errors = problems(ExportFormat::TextMesh, text.as_bytes());
        assert!(errors.iter().any(|e| e.contains("out of range")));
    }

    #[test]
    fn test_obj_non_finite() {
        let text = "v 0 0 0\nv inf 0 0\nv 0 1 0\nf 1 2 3\n";
        let errors = problems(ExportFormat::TextMesh, text.as_bytes());
        assert!(errors.iter().any(|e| e.contains("lines [2]")));
    }

    #[test]
    fn test_glb_bad_magic() {
        let mut glb = archive::build_glb(&fixtures::two_triangle_scene()).unwrap();
        glb[0] = b'x';
        let errors = problems(ExportFormat::Archive, &glb);
        assert!(errors.iter().any(|e| e.contains("magic")));
    }

    #[test]
    fn test_glb_truncated() {
        let glb = archive::build_glb(&fixtures::two_triangle_scene()).unwrap();
        let errors = problems(ExportFormat::Archive, &glb[..glb.len() - 4]);
        assert!(errors.iter().any(|e| e.contains("does not match")));

        let errors = problems(ExportFormat::Archive, &glb[..6]);
        assert!(errors.iter().any(|e| e.contains("truncated")));
    }
}
