//! Renderer: the device contract the loaders build against, plus a headless
//! backend and a wgpu backend (GLSL through naga).

pub mod device;
pub mod gpu;
pub mod headless;
pub mod program;
pub mod reflect;
mod registry;

pub use device::{
    Attachment, BufferUsage, ColorType, DepthType, DeviceLimits, FilterMode, FramebufferDesc,
    RenderDevice, RenderError, RenderResult, TextureParams, UniformLocation, UniformValue,
    VertexArrayInfo, WrapMode,
};
pub use gpu::WgpuDevice;
pub use headless::HeadlessDevice;
pub use program::ProgramStatus;
