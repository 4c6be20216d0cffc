//! Wavefront OBJ models: positions, normals and texture coordinates.
//!
//! Faces are fan-triangulated; `o`/`g`/`s`/`usemtl` and friends are ignored.
//! Models without normals get smooth per-vertex normals.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use glam::{Mat4, Vec3};

use crate::format::VertexFormat;
use crate::geometry::GeometryData;
use crate::mesh::{MeshData, MeshVertex};

/// Post-processing applied to a loaded model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModelFlags {
    pub calculate_tangents: bool,
}

impl ModelFlags {
    pub const CALCULATE_TANGENTS: Self = Self {
        calculate_tangents: true,
    };
}

/// Load a model, apply `transform` and pack it.
///
/// The record is `pos+nrm+tc`, or the full tangent basis plus texcoords when
/// tangents are requested.
pub fn load_model(path: impl AsRef<Path>, transform: Mat4, flags: ModelFlags) -> Result<GeometryData> {
    let path = path.as_ref();
    let mut mesh = load_obj_from_path(path)?;
    mesh.transform(transform);

    let format = if flags.calculate_tangents {
        mesh.compute_tangent_basis();
        VertexFormat::TANGENT_BASIS_TEXCOORD
    } else {
        VertexFormat::POSITION_NORMAL_TEXCOORD
    };
    log::info!(
        "Loaded model {} ({} vertices, {} indices)",
        path.display(),
        mesh.vertices.len(),
        mesh.indices.len()
    );
    Ok(mesh.into_geometry(format))
}

/// Load an OBJ mesh from a file path.
pub fn load_obj_from_path(path: impl AsRef<Path>) -> Result<MeshData> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.as_ref().display()))?;
    load_obj_from_reader(BufReader::new(file))
}

/// Load an OBJ mesh from a [`BufRead`] implementation.
pub fn load_obj_from_reader<R: BufRead>(reader: R) -> Result<MeshData> {
    let mut parser = ObjParser::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        parser.parse_line(line.trim(), line_no + 1)?;
    }
    parser.finish()
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_obj_from_str(contents: &str) -> Result<MeshData> {
    load_obj_from_reader(io::Cursor::new(contents))
}

/// Corner of a face: position, texcoord and normal indices (0-based).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct Corner(usize, Option<usize>, Option<usize>);

#[derive(Default)]
struct ObjParser {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    unique: HashMap<Corner, u32>,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    saw_normals: bool,
}

impl ObjParser {
    fn parse_line(&mut self, line: &str, line_no: usize) -> Result<()> {
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let mut parts = line.split_whitespace();
        let tag = parts
            .next()
            .ok_or_else(|| anyhow!("Malformed OBJ line {line_no}: '{line}'"))?;

        match tag {
            "v" => {
                let p = parse_floats::<3>(&mut parts, line_no, "position")?;
                self.positions.push(p);
            }
            "vt" => {
                let t = parse_floats::<2>(&mut parts, line_no, "texcoord")?;
                self.texcoords.push(t);
            }
            "vn" => {
                let n = parse_floats::<3>(&mut parts, line_no, "normal")?;
                self.normals.push(n);
            }
            "f" => {
                let mut face = Vec::new();
                for token in parts {
                    let corner = self.parse_corner(token, line_no)?;
                    face.push(self.vertex_for(corner, line_no)?);
                }
                if face.len() >= 3 {
                    for tri in 1..face.len() - 1 {
                        self.indices
                            .extend_from_slice(&[face[0], face[tri], face[tri + 1]]);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn parse_corner(&self, token: &str, line_no: usize) -> Result<Corner> {
        let mut split = token.split('/');
        let pos = split
            .next()
            .ok_or_else(|| anyhow!("Malformed face element '{token}' on line {line_no}"))?;
        let pos = resolve_index(pos, self.positions.len(), line_no)?;
        let tex = match split.next() {
            Some(value) if !value.is_empty() => {
                Some(resolve_index(value, self.texcoords.len(), line_no)?)
            }
            _ => None,
        };
        let nrm = match split.next() {
            Some(value) if !value.is_empty() => {
                Some(resolve_index(value, self.normals.len(), line_no)?)
            }
            _ => None,
        };
        Ok(Corner(pos, tex, nrm))
    }

    fn vertex_for(&mut self, corner: Corner, line_no: usize) -> Result<u32> {
        if let Some(&idx) = self.unique.get(&corner) {
            return Ok(idx);
        }
        let Corner(p, t, n) = corner;
        let position = self.positions[p];
        let uv = t.map(|i| self.texcoords[i]).unwrap_or([0.0, 0.0]);
        let normal = match n {
            Some(i) => {
                self.saw_normals = true;
                self.normals[i]
            }
            None => [0.0, 0.0, 0.0],
        };
        let idx = u32::try_from(self.vertices.len())
            .map_err(|_| anyhow!("Too many vertices in OBJ at line {line_no}"))?;
        self.vertices.push(MeshVertex::new(position, normal, uv));
        self.unique.insert(corner, idx);
        Ok(idx)
    }

    fn finish(mut self) -> Result<MeshData> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            bail!("OBJ contained no triangles");
        }
        if !self.saw_normals {
            self.smooth_normals();
        }
        Ok(MeshData::new(self.vertices, self.indices))
    }

    /// Area-weighted vertex normals for models that ship without any.
    fn smooth_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let pa = Vec3::from(self.vertices[a].position);
            let n = (Vec3::from(self.vertices[b].position) - pa)
                .cross(Vec3::from(self.vertices[c].position) - pa);
            for i in [a, b, c] {
                accum[i] += n;
            }
        }
        for (v, n) in self.vertices.iter_mut().zip(accum) {
            v.normal = n.try_normalize().unwrap_or(Vec3::Z).into();
        }
    }
}

fn parse_floats<const N: usize>(
    parts: &mut std::str::SplitWhitespace<'_>,
    line_no: usize,
    what: &str,
) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        let token = parts
            .next()
            .ok_or_else(|| anyhow!("Missing {what} component {i} on line {line_no}"))?;
        *slot = token
            .parse::<f32>()
            .with_context(|| format!("Failed to parse {what} component {i} on line {line_no}"))?;
    }
    Ok(out)
}

/// Resolve a 1-based (or negative, relative) OBJ index.
fn resolve_index(token: &str, len: usize, line_no: usize) -> Result<usize> {
    let raw = token
        .parse::<i64>()
        .with_context(|| format!("Invalid index '{token}' on line {line_no}"))?;
    if raw == 0 {
        bail!("OBJ indices are 1-based; found 0 on line {line_no}");
    }
    let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };
    if idx < 0 || idx as usize >= len {
        bail!("OBJ index {raw} resolved out of bounds (len={len}) on line {line_no}");
    }
    Ok(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::VertexAttribute;

    const TRIANGLE: &str = r#"
        v 0.0 0.0 0.0
        v 1.0 0.0 0.0
        v 0.0 1.0 0.0
        vn 0.0 0.0 1.0
        vt 0.0 0.0
        vt 1.0 0.0
        vt 0.0 1.0
        f 1/1/1 2/2/1 3/3/1
    "#;

    #[test]
    fn parse_simple_triangle() {
        let mesh = load_obj_from_str(TRIANGLE).expect("parse triangle");
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices.len(), 3);
        assert!(mesh.is_valid());
    }

    #[test]
    fn quads_are_fan_triangulated_and_relative_indices_resolve() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf -4 -3 -2 -1\n";
        let mesh = load_obj_from_str(src).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        // no normals in the file: computed from winding
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn zero_index_is_rejected() {
        assert!(load_obj_from_str("v 0 0 0\nf 0 1 1\n").is_err());
    }

    #[test]
    fn load_model_applies_transform_and_tangents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        std::fs::write(&path, TRIANGLE).unwrap();

        let g = load_model(&path, Mat4::from_scale(Vec3::splat(2.0)), ModelFlags::CALCULATE_TANGENTS)
            .unwrap();
        assert_eq!(g.format, VertexFormat::TANGENT_BASIS_TEXCOORD);
        assert_eq!(g.vertex_count(), 3);
        let stride = g.format.floats_per_vertex();
        let t = g.format.float_offset(VertexAttribute::Tangent).unwrap();
        // second vertex: position scaled, tangent along +X
        assert_eq!(&g.vertex_data[stride..stride + 3], &[2.0, 0.0, 0.0]);
        assert!((g.vertex_data[stride + t] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn missing_model_reports_path() {
        let err = load_model("does/not/exist.obj", Mat4::IDENTITY, ModelFlags::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("does/not/exist.obj"));
    }
}
