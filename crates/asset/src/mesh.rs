//! CPU-side mesh representation used by generators and loaders before the
//! data is packed into a [`GeometryData`] record.

use std::collections::HashSet;

use glam::{Mat3, Mat4, Vec2, Vec3};

use crate::format::{Primitive, VertexAttribute, VertexFormat};
use crate::geometry::GeometryData;

/// Unpacked vertex. Values are in object space; attributes a format does not
/// use are simply left out when packing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            ..Self::default()
        }
    }

    pub fn colored(position: [f32; 3], color: [f32; 4]) -> Self {
        Self {
            position,
            color,
            ..Self::default()
        }
    }

    fn write_attribute(&self, attribute: VertexAttribute, out: &mut Vec<f32>) {
        match attribute {
            VertexAttribute::Position => out.extend_from_slice(&self.position),
            VertexAttribute::Normal => out.extend_from_slice(&self.normal),
            VertexAttribute::Color => out.extend_from_slice(&self.color),
            VertexAttribute::Texcoord => out.extend_from_slice(&self.uv),
            VertexAttribute::Tangent => out.extend_from_slice(&self.tangent),
            VertexAttribute::Bitangent => out.extend_from_slice(&self.bitangent),
        }
    }
}

/// Mesh with unpacked vertices. An empty index list means the vertices are
/// drawn in order.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub primitive: Primitive,
}

impl Default for MeshData {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl MeshData {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            primitive: Primitive::Triangles,
        }
    }

    pub fn with_primitive(mut self, primitive: Primitive) -> Self {
        self.primitive = primitive;
        self
    }

    /// Returns `true` if there is something to draw and every index is in range.
    pub fn is_valid(&self) -> bool {
        let len = self.vertices.len();
        len > 0
            && self.indices.iter().all(|&i| (i as usize) < len)
            && self.element_count() % self.primitive.arity() == 0
    }

    fn element_count(&self) -> usize {
        if self.indices.is_empty() {
            self.vertices.len()
        } else {
            self.indices.len()
        }
    }

    /// Append `other`, rebasing its indices. Both meshes must share a primitive.
    pub fn append(&mut self, other: MeshData) {
        debug_assert_eq!(self.primitive, other.primitive);
        let base = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
    }

    /// Apply an affine transform. Directions go through the normal matrix.
    pub fn transform(&mut self, m: Mat4) {
        let linear = Mat3::from_mat4(m);
        let normal_matrix = if linear.determinant().abs() > f32::EPSILON {
            linear.inverse().transpose()
        } else {
            linear
        };
        for v in &mut self.vertices {
            v.position = m.transform_point3(Vec3::from(v.position)).into();
            v.normal = (normal_matrix * Vec3::from(v.normal)).normalize_or_zero().into();
            v.tangent = (linear * Vec3::from(v.tangent)).normalize_or_zero().into();
            v.bitangent = (linear * Vec3::from(v.bitangent)).normalize_or_zero().into();
        }
    }

    /// Remap every position and direction through `f`.
    pub fn remap_axes(&mut self, f: impl Fn(Vec3) -> Vec3) {
        for v in &mut self.vertices {
            v.position = f(Vec3::from(v.position)).into();
            v.normal = f(Vec3::from(v.normal)).into();
            v.tangent = f(Vec3::from(v.tangent)).into();
            v.bitangent = f(Vec3::from(v.bitangent)).into();
        }
    }

    /// Per-vertex tangent and bitangent from positions and texture
    /// coordinates, orthonormalised against the vertex normal.
    pub fn compute_tangent_basis(&mut self) {
        if self.primitive != Primitive::Triangles {
            return;
        }
        let count = self.vertices.len();
        let mut tangents = vec![Vec3::ZERO; count];
        let mut bitangents = vec![Vec3::ZERO; count];

        let triangles: Vec<[usize; 3]> = if self.indices.is_empty() {
            (0..count / 3).map(|t| [3 * t, 3 * t + 1, 3 * t + 2]).collect()
        } else {
            self.indices
                .chunks_exact(3)
                .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
                .collect()
        };

        for [a, b, c] in triangles {
            let (va, vb, vc) = (self.vertices[a], self.vertices[b], self.vertices[c]);
            let e1 = Vec3::from(vb.position) - Vec3::from(va.position);
            let e2 = Vec3::from(vc.position) - Vec3::from(va.position);
            let d1 = Vec2::from(vb.uv) - Vec2::from(va.uv);
            let d2 = Vec2::from(vc.uv) - Vec2::from(va.uv);

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = det.recip();
            let t = (e1 * d2.y - e2 * d1.y) * r;
            let bt = (e2 * d1.x - e1 * d2.x) * r;
            for i in [a, b, c] {
                tangents[i] += t;
                bitangents[i] += bt;
            }
        }

        for (i, v) in self.vertices.iter_mut().enumerate() {
            let n = Vec3::from(v.normal).normalize_or_zero();
            let n = if n == Vec3::ZERO { Vec3::Z } else { n };

            let mut t = (tangents[i] - n * n.dot(tangents[i])).normalize_or_zero();
            if t == Vec3::ZERO {
                // No usable uv gradient: pick any direction perpendicular to n.
                let helper = if n.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
                t = (helper - n * n.dot(helper)).normalize();
            }
            let handedness = if n.cross(t).dot(bitangents[i]) < 0.0 {
                -1.0
            } else {
                1.0
            };
            v.tangent = t.into();
            v.bitangent = (n.cross(t) * handedness).into();
        }
    }

    /// Convert a triangle mesh into its unique edges.
    pub fn to_wireframe(&self) -> MeshData {
        if self.primitive != Primitive::Triangles {
            return self.clone();
        }
        let triangles: Vec<u32> = if self.indices.is_empty() {
            (0..self.vertices.len() as u32).collect()
        } else {
            self.indices.clone()
        };

        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        for tri in triangles.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                if seen.insert((a.min(b), a.max(b))) {
                    lines.extend_from_slice(&[a, b]);
                }
            }
        }
        MeshData::new(self.vertices.clone(), lines).with_primitive(Primitive::Lines)
    }

    /// Pack into an interleaved record using `format`.
    pub fn into_geometry(self, format: VertexFormat) -> GeometryData {
        let mut data = Vec::with_capacity(self.vertices.len() * format.floats_per_vertex());
        for v in &self.vertices {
            for attribute in format.attributes() {
                v.write_attribute(attribute, &mut data);
            }
        }
        GeometryData::new(format, self.primitive, data, self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshData {
        let n = [0.0, 0.0, 1.0];
        MeshData::new(
            vec![
                MeshVertex::new([0.0, 0.0, 0.0], n, [0.0, 0.0]),
                MeshVertex::new([1.0, 0.0, 0.0], n, [1.0, 0.0]),
                MeshVertex::new([1.0, 1.0, 0.0], n, [1.0, 1.0]),
                MeshVertex::new([0.0, 1.0, 0.0], n, [0.0, 1.0]),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn mesh_data_validity() {
        assert!(quad().is_valid());
        let broken = MeshData::new(vec![MeshVertex::default()], vec![0, 1, 2]);
        assert!(!broken.is_valid());
    }

    #[test]
    fn tangent_basis_follows_uv_axes() {
        let mut mesh = quad();
        mesh.compute_tangent_basis();
        for v in &mesh.vertices {
            assert!((Vec3::from(v.tangent) - Vec3::X).length() < 1e-5);
            assert!((Vec3::from(v.bitangent) - Vec3::Y).length() < 1e-5);
        }
    }

    #[test]
    fn wireframe_dedupes_shared_edges() {
        let lines = quad().to_wireframe();
        assert_eq!(lines.primitive, Primitive::Lines);
        // 4 outer edges + 1 diagonal
        assert_eq!(lines.indices.len(), 5 * 2);
    }

    #[test]
    fn transform_scales_positions_and_keeps_unit_normals() {
        let mut mesh = quad();
        mesh.transform(Mat4::from_scale(Vec3::new(2.0, 2.0, 0.5)));
        assert_eq!(mesh.vertices[2].position, [2.0, 2.0, 0.0]);
        assert!((Vec3::from(mesh.vertices[0].normal) - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn packing_respects_format_order() {
        let geometry = quad().into_geometry(VertexFormat::POSITION_NORMAL_TEXCOORD);
        assert_eq!(geometry.vertex_count(), 4);
        assert_eq!(&geometry.vertex_data[8..16], &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
    }
}
