//! Procedural shape descriptors and their generators.
//!
//! Round shapes are built as surfaces of revolution around +Z from a 2D
//! profile (radius, height); the result is then rotated so the shape's long
//! axis lines up with the requested [`Axis`]. Flat faces are subdivided grids.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use anyhow::{Result, ensure};
use glam::{Vec2, Vec3};

use crate::format::{Primitive, VertexAttribute, VertexFormat};
use crate::geometry::GeometryData;
use crate::mesh::{MeshData, MeshVertex};

/// Axis a shape is aligned to (normal of a plane, long axis of a cylinder).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    #[default]
    Z,
}

impl Axis {
    /// Map a shape built around +Z onto this axis. Both maps are cyclic
    /// permutations, so winding and handedness are preserved.
    fn remap(self, p: Vec3) -> Vec3 {
        match self {
            Axis::X => Vec3::new(p.z, p.x, p.y),
            Axis::Y => Vec3::new(p.y, p.z, p.x),
            Axis::Z => p,
        }
    }
}

/// Which attributes a generated shape carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeometryFlags {
    pub wireframe: bool,
    pub texcoords: bool,
    pub normals: bool,
}

impl GeometryFlags {
    pub const WIREFRAME: Self = Self {
        wireframe: true,
        texcoords: false,
        normals: false,
    };
    pub const TEXCOORDS_NORMALS: Self = Self {
        wireframe: false,
        texcoords: true,
        normals: true,
    };
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    /// Three colored unit lines along +X, +Y and +Z.
    Axes { length: f32 },
    Plane {
        axis: Axis,
        width: f32,
        height: f32,
        width_divisions: u32,
        height_divisions: u32,
    },
    Box {
        width: f32,
        height: f32,
        depth: f32,
        width_divisions: u32,
        height_divisions: u32,
        depth_divisions: u32,
    },
    Sphere {
        axis: Axis,
        radius: f32,
        slices: u32,
        stacks: u32,
    },
    /// Base at the origin, extends `length` along the axis. `stacks` divide
    /// the side, `rings` divide each cap.
    Cylinder {
        axis: Axis,
        radius: f32,
        length: f32,
        slices: u32,
        stacks: u32,
        rings: u32,
    },
    /// Cylinder body of `length` closed by hemispheres. `stacks` divide each
    /// hemisphere, `rings` divide the body.
    Capsule {
        axis: Axis,
        radius: f32,
        length: f32,
        slices: u32,
        stacks: u32,
        rings: u32,
    },
    Torus {
        axis: Axis,
        major_radius: f32,
        minor_radius: f32,
        slices: u32,
        stacks: u32,
    },
    /// Base at the origin, apex at `length`. `stacks` divide the side,
    /// `rings` divide the base.
    Cone {
        axis: Axis,
        radius: f32,
        length: f32,
        slices: u32,
        stacks: u32,
        rings: u32,
    },
}

/// Procedural generation parameters for one shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeDescriptor {
    pub shape: Shape,
    pub flags: GeometryFlags,
}

impl ShapeDescriptor {
    pub fn new(shape: Shape, flags: GeometryFlags) -> Self {
        Self { shape, flags }
    }

    pub fn axes(length: f32) -> Self {
        Self::new(Shape::Axes { length }, GeometryFlags::WIREFRAME)
    }

    pub fn plane(
        flags: GeometryFlags,
        axis: Axis,
        width: f32,
        height: f32,
        width_divisions: u32,
        height_divisions: u32,
    ) -> Self {
        Self::new(
            Shape::Plane {
                axis,
                width,
                height,
                width_divisions,
                height_divisions,
            },
            flags,
        )
    }

    /// Layout of the generated record.
    pub fn vertex_format(&self) -> VertexFormat {
        if let Shape::Axes { .. } = self.shape {
            return VertexFormat::POSITION_COLOR;
        }
        if self.flags.wireframe {
            return VertexFormat::POSITION;
        }
        let mut format = VertexFormat::POSITION;
        if self.flags.normals {
            format = format.with(VertexAttribute::Normal);
        }
        if self.flags.texcoords {
            format = format.with(VertexAttribute::Texcoord);
        }
        format
    }

    pub fn generate(&self) -> Result<GeometryData> {
        self.check()?;
        let mesh = match self.shape {
            Shape::Axes { length } => axes(length),
            Shape::Plane {
                axis,
                width,
                height,
                width_divisions,
                height_divisions,
            } => {
                let mut mesh = if self.flags.wireframe {
                    plane_lines(width, height, width_divisions, height_divisions)
                } else {
                    grid_face(
                        Vec3::new(-0.5 * width, -0.5 * height, 0.0),
                        Vec3::X * width,
                        Vec3::Y * height,
                        width_divisions,
                        height_divisions,
                    )
                };
                mesh.remap_axes(|p| axis.remap(p));
                mesh
            }
            Shape::Box {
                width,
                height,
                depth,
                width_divisions,
                height_divisions,
                depth_divisions,
            } => box_faces(
                Vec3::new(width, height, depth),
                [width_divisions, height_divisions, depth_divisions],
            ),
            Shape::Sphere {
                axis,
                radius,
                slices,
                stacks,
            } => aligned(axis, lathe(&sphere_profile(radius, 0.0, -FRAC_PI_2, FRAC_PI_2, stacks), slices)),
            Shape::Cylinder {
                axis,
                radius,
                length,
                slices,
                stacks,
                rings,
            } => aligned(axis, cylinder(radius, length, slices, stacks, rings)),
            Shape::Capsule {
                axis,
                radius,
                length,
                slices,
                stacks,
                rings,
            } => aligned(axis, capsule(radius, length, slices, stacks, rings)),
            Shape::Torus {
                axis,
                major_radius,
                minor_radius,
                slices,
                stacks,
            } => aligned(axis, lathe(&torus_profile(major_radius, minor_radius, stacks), slices)),
            Shape::Cone {
                axis,
                radius,
                length,
                slices,
                stacks,
                rings,
            } => aligned(axis, cone(radius, length, slices, stacks, rings)),
        };

        let mesh = match self.shape {
            Shape::Axes { .. } | Shape::Plane { .. } => mesh,
            _ if self.flags.wireframe => mesh.to_wireframe(),
            _ => mesh,
        };
        Ok(mesh.into_geometry(self.vertex_format()))
    }

    fn check(&self) -> Result<()> {
        match self.shape {
            Shape::Axes { length } => ensure!(length > 0.0, "axes length must be positive"),
            Shape::Plane {
                width,
                height,
                width_divisions,
                height_divisions,
                ..
            } => {
                ensure!(width > 0.0 && height > 0.0, "plane extent must be positive");
                ensure!(
                    width_divisions > 0 && height_divisions > 0,
                    "plane needs at least one division per side"
                );
            }
            Shape::Box {
                width,
                height,
                depth,
                width_divisions,
                height_divisions,
                depth_divisions,
            } => {
                ensure!(width > 0.0 && height > 0.0 && depth > 0.0, "box extent must be positive");
                ensure!(
                    width_divisions > 0 && height_divisions > 0 && depth_divisions > 0,
                    "box needs at least one division per side"
                );
            }
            Shape::Sphere { radius, slices, stacks, .. } => {
                ensure!(radius > 0.0, "sphere radius must be positive");
                ensure!(slices >= 3 && stacks >= 2, "sphere needs >= 3 slices and >= 2 stacks");
            }
            Shape::Cylinder { radius, length, slices, stacks, rings, .. }
            | Shape::Capsule { radius, length, slices, stacks, rings, .. }
            | Shape::Cone { radius, length, slices, stacks, rings, .. } => {
                ensure!(radius > 0.0 && length > 0.0, "radius and length must be positive");
                ensure!(
                    slices >= 3 && stacks >= 1 && rings >= 1,
                    "need >= 3 slices, >= 1 stack and >= 1 ring"
                );
            }
            Shape::Torus {
                major_radius,
                minor_radius,
                slices,
                stacks,
                ..
            } => {
                ensure!(
                    major_radius > 0.0 && minor_radius > 0.0,
                    "torus radii must be positive"
                );
                ensure!(slices >= 3 && stacks >= 3, "torus needs >= 3 slices and stacks");
            }
        }
        Ok(())
    }
}

fn aligned(axis: Axis, mut mesh: MeshData) -> MeshData {
    mesh.remap_axes(|p| axis.remap(p));
    mesh
}

fn axes(length: f32) -> MeshData {
    let tips = [
        (Vec3::X, [1.0, 0.0, 0.0, 1.0]),
        (Vec3::Y, [0.0, 1.0, 0.0, 1.0]),
        (Vec3::Z, [0.0, 0.0, 1.0, 1.0]),
    ];
    let vertices = tips
        .iter()
        .flat_map(|&(dir, color)| {
            [
                MeshVertex::colored([0.0; 3], color),
                MeshVertex::colored((dir * length).into(), color),
            ]
        })
        .collect();
    MeshData::new(vertices, Vec::new()).with_primitive(Primitive::Lines)
}

/// Subdivided quad spanning `origin + s*u + t*v`, facing `u x v`.
fn grid_face(origin: Vec3, u: Vec3, v: Vec3, u_divisions: u32, v_divisions: u32) -> MeshData {
    let normal = u.cross(v).normalize_or_zero();
    let columns = u_divisions + 1;
    let mut vertices = Vec::with_capacity((columns * (v_divisions + 1)) as usize);
    for j in 0..=v_divisions {
        let t = j as f32 / v_divisions as f32;
        for i in 0..=u_divisions {
            let s = i as f32 / u_divisions as f32;
            let p = origin + u * s + v * t;
            vertices.push(MeshVertex::new(p.into(), normal.into(), [s, t]));
        }
    }

    let mut indices = Vec::with_capacity((u_divisions * v_divisions * 6) as usize);
    for j in 0..v_divisions {
        for i in 0..u_divisions {
            let a = j * columns + i;
            let b = a + 1;
            let d = a + columns;
            let c = d + 1;
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }
    MeshData::new(vertices, indices)
}

/// Grid lines of a plane; no diagonals.
fn plane_lines(width: f32, height: f32, width_divisions: u32, height_divisions: u32) -> MeshData {
    let mut grid = grid_face(
        Vec3::new(-0.5 * width, -0.5 * height, 0.0),
        Vec3::X * width,
        Vec3::Y * height,
        width_divisions,
        height_divisions,
    );
    let columns = width_divisions + 1;
    let mut lines = Vec::new();
    for j in 0..=height_divisions {
        for i in 0..width_divisions {
            let a = j * columns + i;
            lines.extend_from_slice(&[a, a + 1]);
        }
    }
    for i in 0..=width_divisions {
        for j in 0..height_divisions {
            let a = j * columns + i;
            lines.extend_from_slice(&[a, a + columns]);
        }
    }
    grid.indices = lines;
    grid.primitive = Primitive::Lines;
    grid
}

fn box_faces(size: Vec3, [dx, dy, dz]: [u32; 3]) -> MeshData {
    let h = size * 0.5;
    let faces = [
        // +Z, -Z
        (Vec3::new(-h.x, -h.y, h.z), Vec3::X * size.x, Vec3::Y * size.y, dx, dy),
        (Vec3::new(h.x, -h.y, -h.z), -Vec3::X * size.x, Vec3::Y * size.y, dx, dy),
        // +X, -X
        (Vec3::new(h.x, -h.y, h.z), -Vec3::Z * size.z, Vec3::Y * size.y, dz, dy),
        (Vec3::new(-h.x, -h.y, -h.z), Vec3::Z * size.z, Vec3::Y * size.y, dz, dy),
        // +Y, -Y
        (Vec3::new(-h.x, h.y, h.z), Vec3::X * size.x, -Vec3::Z * size.z, dx, dz),
        (Vec3::new(-h.x, -h.y, -h.z), Vec3::X * size.x, Vec3::Z * size.z, dx, dz),
    ];
    let mut mesh = MeshData::default();
    for (origin, u, v, du, dv) in faces {
        mesh.append(grid_face(origin, u, v, du, dv));
    }
    mesh
}

/// Point on a revolution profile: distance from the axis, height along it,
/// and the (radial, axial) normal.
#[derive(Clone, Copy, Debug)]
struct ProfilePoint {
    radius: f32,
    z: f32,
    normal: Vec2,
    v: f32,
}

/// Revolve `profile` around +Z. Profiles running away from the axis (or up
/// along it) produce outward-facing counter-clockwise triangles.
fn lathe(profile: &[ProfilePoint], slices: u32) -> MeshData {
    let columns = slices + 1;
    let mut vertices = Vec::with_capacity(profile.len() * columns as usize);
    for p in profile {
        for j in 0..=slices {
            let u = j as f32 / slices as f32;
            let (s, c) = (u * TAU).sin_cos();
            vertices.push(MeshVertex::new(
                [p.radius * c, p.radius * s, p.z],
                [p.normal.x * c, p.normal.x * s, p.normal.y],
                [u, p.v],
            ));
        }
    }

    let mut indices = Vec::new();
    for i in 0..profile.len().saturating_sub(1) as u32 {
        for j in 0..slices {
            let a = i * columns + j;
            let b = a + 1;
            let d = a + columns;
            let c = d + 1;
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }
    MeshData::new(vertices, indices)
}

/// Arc of a sphere centred on the axis at height `center`, from latitude
/// `from` to `to`.
fn sphere_profile(radius: f32, center: f32, from: f32, to: f32, stacks: u32) -> Vec<ProfilePoint> {
    (0..=stacks)
        .map(|i| {
            let t = i as f32 / stacks as f32;
            let phi = from + (to - from) * t;
            let (s, c) = phi.sin_cos();
            ProfilePoint {
                radius: radius * c,
                z: center + radius * s,
                normal: Vec2::new(c, s),
                v: t,
            }
        })
        .collect()
}

fn disc_profile(radius: f32, z: f32, rings: u32, facing_up: bool) -> Vec<ProfilePoint> {
    let normal = if facing_up { Vec2::Y } else { -Vec2::Y };
    (0..=rings)
        .map(|i| {
            let t = i as f32 / rings as f32;
            let t = if facing_up { 1.0 - t } else { t };
            ProfilePoint {
                radius: radius * t,
                z,
                normal,
                v: t,
            }
        })
        .collect()
}

fn side_profile(bottom: Vec2, top: Vec2, stacks: u32) -> Vec<ProfilePoint> {
    let dir = top - bottom;
    let normal = Vec2::new(dir.y, -dir.x).normalize_or_zero();
    (0..=stacks)
        .map(|i| {
            let t = i as f32 / stacks as f32;
            let p = bottom + dir * t;
            ProfilePoint {
                radius: p.x,
                z: p.y,
                normal,
                v: t,
            }
        })
        .collect()
}

fn torus_profile(major: f32, minor: f32, stacks: u32) -> Vec<ProfilePoint> {
    (0..=stacks)
        .map(|i| {
            let t = i as f32 / stacks as f32;
            let (s, c) = (-PI + TAU * t).sin_cos();
            ProfilePoint {
                radius: major + minor * c,
                z: minor * s,
                normal: Vec2::new(c, s),
                v: t,
            }
        })
        .collect()
}

fn cylinder(radius: f32, length: f32, slices: u32, stacks: u32, rings: u32) -> MeshData {
    let mut mesh = lathe(&disc_profile(radius, 0.0, rings, false), slices);
    mesh.append(lathe(
        &side_profile(Vec2::new(radius, 0.0), Vec2::new(radius, length), stacks),
        slices,
    ));
    mesh.append(lathe(&disc_profile(radius, length, rings, true), slices));
    mesh
}

fn capsule(radius: f32, length: f32, slices: u32, stacks: u32, rings: u32) -> MeshData {
    let mut mesh = lathe(&sphere_profile(radius, 0.0, -FRAC_PI_2, 0.0, stacks), slices);
    mesh.append(lathe(
        &side_profile(Vec2::new(radius, 0.0), Vec2::new(radius, length), rings),
        slices,
    ));
    mesh.append(lathe(
        &sphere_profile(radius, length, 0.0, FRAC_PI_2, stacks),
        slices,
    ));
    mesh
}

fn cone(radius: f32, length: f32, slices: u32, stacks: u32, rings: u32) -> MeshData {
    let mut mesh = lathe(&disc_profile(radius, 0.0, rings, false), slices);
    mesh.append(lathe(
        &side_profile(Vec2::new(radius, 0.0), Vec2::new(0.0, length), stacks),
        slices,
    ));
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(g: &GeometryData) -> Vec<Vec3> {
        let floats = g.format.floats_per_vertex();
        g.vertex_data
            .chunks_exact(floats)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
            .collect()
    }

    fn normals(g: &GeometryData) -> Vec<Vec3> {
        let floats = g.format.floats_per_vertex();
        let offset = g.format.float_offset(VertexAttribute::Normal).unwrap();
        g.vertex_data
            .chunks_exact(floats)
            .map(|v| Vec3::new(v[offset], v[offset + 1], v[offset + 2]))
            .collect()
    }

    /// Every triangle with non-zero area must face away from `center`.
    fn assert_outward(g: &GeometryData, center: Vec3) {
        let p = positions(g);
        for tri in g.indices.chunks_exact(3) {
            let (a, b, c) = (p[tri[0] as usize], p[tri[1] as usize], p[tri[2] as usize]);
            let n = (b - a).cross(c - a);
            if n.length() < 1e-6 {
                continue;
            }
            let centroid = (a + b + c) / 3.0;
            assert!(n.dot(centroid - center) > 0.0, "inward triangle {tri:?}");
        }
    }

    #[test]
    fn axes_are_six_colored_line_vertices() {
        let g = ShapeDescriptor::axes(1.0).generate().unwrap();
        assert_eq!(g.format, VertexFormat::POSITION_COLOR);
        assert_eq!(g.primitive, Primitive::Lines);
        assert_eq!(g.vertex_count(), 6);
        assert!(!g.is_indexed());
    }

    #[test]
    fn wireframe_grid_has_only_grid_lines() {
        let g = ShapeDescriptor::plane(GeometryFlags::WIREFRAME, Axis::Z, 20.0, 20.0, 20, 20)
            .generate()
            .unwrap();
        assert_eq!(g.format, VertexFormat::POSITION);
        assert_eq!(g.vertex_count(), 21 * 21);
        // 21 rows and 21 columns of 20 segments each
        assert_eq!(g.index_count(), 2 * 2 * 21 * 20);
    }

    #[test]
    fn unit_plane_faces_its_axis() {
        let g = ShapeDescriptor::plane(GeometryFlags::TEXCOORDS_NORMALS, Axis::X, 1.0, 1.0, 1, 1)
            .generate()
            .unwrap();
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.index_count(), 6);
        for n in normals(&g) {
            assert!((n - Vec3::X).length() < 1e-6);
        }
    }

    #[test]
    fn box_faces_point_outward() {
        let g = ShapeDescriptor::new(
            Shape::Box {
                width: 1.0,
                height: 1.0,
                depth: 1.0,
                width_divisions: 1,
                height_divisions: 1,
                depth_divisions: 1,
            },
            GeometryFlags::TEXCOORDS_NORMALS,
        )
        .generate()
        .unwrap();
        assert_eq!(g.vertex_count(), 24);
        assert_eq!(g.index_count(), 36);
        assert_outward(&g, Vec3::ZERO);
    }

    #[test]
    fn sphere_is_closed_and_outward() {
        let g = ShapeDescriptor::new(
            Shape::Sphere {
                axis: Axis::Z,
                radius: 1.0,
                slices: 32,
                stacks: 24,
            },
            GeometryFlags::TEXCOORDS_NORMALS,
        )
        .generate()
        .unwrap();
        assert_eq!(g.vertex_count(), 33 * 25);
        for p in positions(&g) {
            assert!((p.length() - 1.0).abs() < 1e-5);
        }
        assert_outward(&g, Vec3::ZERO);
    }

    #[test]
    fn cylinder_along_x_is_outward() {
        let g = ShapeDescriptor::new(
            Shape::Cylinder {
                axis: Axis::X,
                radius: 1.0,
                length: 1.0,
                slices: 32,
                stacks: 4,
                rings: 4,
            },
            GeometryFlags::TEXCOORDS_NORMALS,
        )
        .generate()
        .unwrap();
        let xs: Vec<f32> = positions(&g).iter().map(|p| p.x).collect();
        assert!(xs.iter().all(|&x| (-1e-6..=1.0 + 1e-6).contains(&x)));
        assert_outward(&g, Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn torus_and_cone_generate() {
        let torus = ShapeDescriptor::new(
            Shape::Torus {
                axis: Axis::X,
                major_radius: 1.0,
                minor_radius: 0.25,
                slices: 32,
                stacks: 24,
            },
            GeometryFlags::TEXCOORDS_NORMALS,
        )
        .generate()
        .unwrap();
        assert_eq!(torus.vertex_count(), 33 * 25);
        assert!(torus.is_valid());

        let cone = ShapeDescriptor::new(
            Shape::Cone {
                axis: Axis::X,
                radius: 1.0,
                length: 1.0,
                slices: 32,
                stacks: 1,
                rings: 1,
            },
            GeometryFlags::TEXCOORDS_NORMALS,
        )
        .generate()
        .unwrap();
        assert!(cone.is_valid());
        assert_outward(&cone, Vec3::new(0.25, 0.0, 0.0));
    }

    #[test]
    fn wireframe_solid_uses_lines() {
        let g = ShapeDescriptor::new(
            Shape::Capsule {
                axis: Axis::Y,
                radius: 1.0,
                length: 1.0,
                slices: 8,
                stacks: 4,
                rings: 2,
            },
            GeometryFlags::WIREFRAME,
        )
        .generate()
        .unwrap();
        assert_eq!(g.primitive, Primitive::Lines);
        assert_eq!(g.format, VertexFormat::POSITION);
        assert!(g.is_valid());
    }

    #[test]
    fn degenerate_parameters_are_rejected() {
        let bad = ShapeDescriptor::new(
            Shape::Sphere {
                axis: Axis::Z,
                radius: 1.0,
                slices: 2,
                stacks: 2,
            },
            GeometryFlags::TEXCOORDS_NORMALS,
        );
        assert!(bad.generate().is_err());
    }
}
