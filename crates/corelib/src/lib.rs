//! Core types: math re-exports, resource handles, errors.

pub use glam::{Mat3, Mat4, Vec2, Vec3, Vec4, vec3};

pub mod error;
pub mod handle;

pub use error::{CoreError, CoreResult};
pub use handle::{
    BufferHandle, FramebufferHandle, Handle, LibraryEpoch, ProgramHandle, ReleaseFn, ReleaseHook,
    ResourceId, ResourceKind, ResourceType, ShaderHandle, TextureHandle, VertexArrayHandle,
};
