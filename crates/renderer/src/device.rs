//! The rendering-library contract the demo loaders are written against.
//!
//! Calls mirror a GL-style object API: create an object, get a handle back,
//! configure it through further calls keyed by [`ResourceId`]. Handles carry
//! a release hook issued by the device; [`RenderDevice::release_hook`] hands
//! out fresh hooks after the library has been reloaded.

use asset::{ShaderStage, TextureData, VertexFormat};
use corelib::{
    BufferHandle, CoreError, FramebufferHandle, LibraryEpoch, Mat4, ProgramHandle, ReleaseHook,
    ResourceId, ResourceKind, ShaderHandle, TextureHandle, VertexArrayHandle, Vec4,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no live {kind} with id {id}")]
    Unknown { kind: ResourceKind, id: ResourceId },
    #[error("resource {id} is a {actual}, expected a {expected}")]
    WrongKind {
        id: ResourceId,
        expected: ResourceKind,
        actual: ResourceKind,
    },
    #[error("write of {len} bytes at offset {offset} overflows buffer '{name}' of {size} bytes")]
    BufferOverflow {
        name: String,
        offset: u64,
        len: u64,
        size: u64,
    },
    #[error("shader '{name}' failed to compile: {log}")]
    CompileFailed { name: String, log: String },
    #[error("{stage} shaders are not supported by the {backend} backend")]
    UnsupportedStage {
        stage: ShaderStage,
        backend: &'static str,
    },
    #[error("program '{name}' failed to link: {reason}")]
    LinkFailed { name: String, reason: String },
    #[error("program '{name}' failed to validate: {reason}")]
    ValidateFailed { name: String, reason: String },
    #[error("uniform at location {location} of program '{program}' is a {expected}")]
    UniformType {
        program: String,
        location: i32,
        expected: String,
    },
    #[error("framebuffer '{name}' has no attachment {attachment:?}")]
    NoAttachment { name: String, attachment: Attachment },
    #[error("device error: {0}")]
    Device(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex and index data for drawables.
    DrawData,
    Uniform,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Double(f64),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// Location of a default-block uniform within a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub i32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
}

/// Sampling state of a texture. The default is what a freshly created
/// texture starts with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureParams {
    pub filter: FilterMode,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
}

impl TextureParams {
    pub const fn new(filter: FilterMode, wrap_u: WrapMode, wrap_v: WrapMode) -> Self {
        Self {
            filter,
            wrap_u,
            wrap_v,
        }
    }

    pub const LINEAR_CLAMP: Self = Self::new(FilterMode::Linear, WrapMode::Clamp, WrapMode::Clamp);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorType {
    Rgba8,
    Rgba16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthType {
    Depth24Stencil8,
    Depth32,
}

/// Render target layout: `color_targets` color attachments (each of
/// `color_type`) plus an optional depth attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub color_targets: u32,
    pub color_type: ColorType,
    pub depth: Option<DepthType>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment {
    Color(u32),
    Depth,
}

/// What a vertex array records: `format` vertices in `buffer` from `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexArrayInfo {
    pub buffer: ResourceId,
    pub format: VertexFormat,
    pub offset: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_uniform_block_size: u64,
}

pub trait RenderDevice {
    fn backend_name(&self) -> &'static str;

    fn limits(&self) -> DeviceLimits;

    /// Reload counter shared with every hook this device hands out.
    fn epoch(&self) -> &LibraryEpoch;

    /// A release hook for `kind` bound to the current library epoch.
    fn release_hook(&self, kind: ResourceKind) -> ReleaseHook;

    fn create_buffer(&mut self, name: &str, usage: BufferUsage, size: u64)
    -> RenderResult<BufferHandle>;

    /// Write `data` at `offset`. Writes past the end are rejected.
    fn write_buffer(&mut self, buffer: ResourceId, offset: u64, data: &[u8]) -> RenderResult<()>;

    /// Describe `format` vertices stored in `buffer` starting at `offset`.
    fn create_vertex_array(
        &mut self,
        name: &str,
        buffer: ResourceId,
        format: VertexFormat,
        offset: u64,
    ) -> RenderResult<VertexArrayHandle>;

    /// Make `vertex_array` the active one; `None` deactivates.
    fn activate_vertex_array(&mut self, vertex_array: Option<ResourceId>) -> RenderResult<()>;

    /// Create a shader object. Nothing is compiled yet.
    fn create_shader(&mut self, name: &str, stage: ShaderStage) -> RenderResult<ShaderHandle>;

    fn compile_shader(&mut self, shader: ResourceId, source: &str) -> RenderResult<()>;

    fn create_program(&mut self, name: &str) -> RenderResult<ProgramHandle>;

    /// Attach a shader. The program keeps what it needs from the shader, so
    /// the shader may be released afterwards.
    fn attach_shader(&mut self, program: ResourceId, shader: ResourceId) -> RenderResult<()>;

    fn link_program(&mut self, program: ResourceId) -> RenderResult<()>;

    /// Check the program against the active vertex array.
    fn validate_program(&mut self, program: ResourceId) -> RenderResult<()>;

    fn activate_program(&mut self, program: Option<ResourceId>) -> RenderResult<()>;

    /// Location of a uniform in a linked program, `None` if absent.
    fn uniform_location(&self, program: ResourceId, name: &str) -> Option<UniformLocation>;

    fn set_uniform(
        &mut self,
        program: ResourceId,
        location: UniformLocation,
        value: UniformValue,
    ) -> RenderResult<()>;

    /// Index of a uniform block in a linked program, `None` if absent.
    fn uniform_block_index(&self, program: ResourceId, name: &str) -> Option<u32>;

    fn bind_uniform_block(&mut self, program: ResourceId, block: u32, binding: u32)
    -> RenderResult<()>;

    /// Upload a texture with default sampling state.
    fn create_texture(&mut self, name: &str, data: &TextureData) -> RenderResult<TextureHandle>;

    fn set_texture_params(&mut self, texture: ResourceId, params: TextureParams)
    -> RenderResult<()>;

    fn create_framebuffer(
        &mut self,
        name: &str,
        desc: &FramebufferDesc,
    ) -> RenderResult<FramebufferHandle>;

    fn set_attachment_params(
        &mut self,
        framebuffer: ResourceId,
        attachment: Attachment,
        params: TextureParams,
    ) -> RenderResult<()>;

    /// Number of live objects of `kind`.
    fn live_count(&self, kind: ResourceKind) -> usize;
}
