//! Asset loading/parsers: geometry records, procedural shapes, OBJ models,
//! the geometry cache stream, textures and shader sources.

pub mod cache;
pub mod format;
pub mod geometry;
pub mod mesh;
pub mod obj;
pub mod procedural;
pub mod shader;
pub mod texture;

pub use cache::{GeometryStreamReader, GeometryStreamWriter};
pub use format::{IndexFormat, Primitive, VertexAttribute, VertexFormat};
pub use geometry::GeometryData;
pub use mesh::{MeshData, MeshVertex};
pub use obj::{ModelFlags, load_model};
pub use procedural::{Axis, GeometryFlags, Shape, ShapeDescriptor};
pub use shader::{ShaderSourceDesc, ShaderStage};
pub use texture::{TextureData, TextureFormat};
