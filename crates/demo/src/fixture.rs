//! On-disk resources for loader tests: GLSL for every shader, a PNG for every
//! texture and a small OBJ standing in for the teapot.

use std::{
    fs,
    path::{Path, PathBuf},
};

use asset::shader::GLSL_ROOT;
use asset::{ShaderStage, TextureData, VertexFormat};
use corelib::{
    BufferHandle, FramebufferHandle, LibraryEpoch, ProgramHandle, ReleaseHook, ResourceId,
    ResourceKind, ShaderHandle, TextureHandle, VertexArrayHandle,
};
use image::{Rgba, RgbaImage};
use renderer::{
    Attachment, BufferUsage, DeviceLimits, FramebufferDesc, HeadlessDevice, RenderDevice,
    RenderError, RenderResult, TextureParams, UniformLocation, UniformValue,
};
use tempfile::TempDir;

use crate::config::LoadConfig;
use crate::shaders::SHADERS;
use crate::textures::TEXTURES;

pub const VERTEX_SOURCE: &str = "#version 450

layout (location = 0) in vec4 aPosition;
layout (location = 2) in vec3 aNormal;
layout (location = 8) in vec4 aTexcoord;

uniform mat4 uMVP, uMV_nrm;
uniform double uTime;
uniform ubTransformStack
{
\tmat4 uModelMat[16];
};

out vec4 vTexcoord;

void main()
{
\tvTexcoord = aTexcoord;
\tgl_Position = uMVP * aPosition;
}
";

pub const GEOMETRY_SOURCE: &str = "#version 450

layout (triangles) in;
layout (line_strip, max_vertices = 18) out;

uniform mat4 uP;

void main()
{
\tgl_Position = uP * gl_in[0].gl_Position;
\tEmitVertex();
\tEndPrimitive();
}
";

pub const FRAGMENT_SOURCE: &str = "#version 450

uniform vec4 uColor;
uniform sampler2D uTex_dm, uTex_sm;
uniform int uCount;
layout (std140) uniform ubLight
{
\tvec4 uLightPos[4];
};

in vec4 vTexcoord;

layout (location = 0) out vec4 rtFragColor;

void main()
{
\trtFragColor = uColor * texture(uTex_dm, vTexcoord.xy);
}
";

pub const UTIL_SOURCE: &str = "vec4 unpack(in vec4 v)
{
\treturn v * 0.5 + 0.5;
}
";

pub const TEAPOT_OBJ: &str = "# quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

pub struct Fixture {
    dir: TempDir,
    pub config: LoadConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let resource_dir = dir.path().join("resource");
        write_shader_sources(&resource_dir);
        write_textures(&resource_dir);
        write(&resource_dir.join("obj/teapot/teapot.obj"), TEAPOT_OBJ);

        let config = LoadConfig::default()
            .with_resource_dir(resource_dir)
            .with_cache_path(dir.path().join("data/scene_geometry.dat"))
            .with_frame_size(64, 48);
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn resource(&self, relative: &str) -> PathBuf {
        self.config.resource(relative)
    }

    pub fn shader_file(&self, stage: ShaderStage, file: &str) -> PathBuf {
        self.config
            .resource_dir
            .join(GLSL_ROOT)
            .join(stage.directory())
            .join(file)
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn write_shader_sources(resource_dir: &Path) {
    for desc in &SHADERS {
        let main = match desc.stage {
            ShaderStage::Vertex => VERTEX_SOURCE,
            ShaderStage::Geometry => GEOMETRY_SOURCE,
            ShaderStage::Fragment => FRAGMENT_SOURCE,
        };
        for (i, path) in desc.paths(resource_dir).iter().enumerate() {
            write(path, if i == 0 { main } else { UTIL_SOURCE });
        }
    }
}

fn write_textures(resource_dir: &Path) {
    for (i, row) in TEXTURES.iter().enumerate() {
        let path = resource_dir.join(row.path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let shade = (i * 10) as u8;
        RgbaImage::from_pixel(4, 2, Rgba([shade, 64, 128, 255]))
            .save(&path)
            .unwrap();
    }
}

/// Device calls a [`FailingDevice`] can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailOn {
    CreateShader,
    CreateProgram,
    AttachShader,
    WriteBuffer,
}

/// A headless device whose `n`th call (from 1) of one kind fails.
pub struct FailingDevice {
    pub inner: HeadlessDevice,
    fail_on: FailOn,
    fail_at: usize,
    calls: usize,
}

impl FailingDevice {
    pub fn new(fail_on: FailOn, fail_at: usize) -> Self {
        Self {
            inner: HeadlessDevice::new(),
            fail_on,
            fail_at,
            calls: 0,
        }
    }

    fn check(&mut self, call: FailOn) -> RenderResult<()> {
        if call != self.fail_on {
            return Ok(());
        }
        self.calls += 1;
        if self.calls == self.fail_at {
            return Err(RenderError::Device(format!("injected {call:?} failure")));
        }
        Ok(())
    }
}

impl RenderDevice for FailingDevice {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    fn limits(&self) -> DeviceLimits {
        self.inner.limits()
    }

    fn epoch(&self) -> &LibraryEpoch {
        self.inner.epoch()
    }

    fn release_hook(&self, kind: ResourceKind) -> ReleaseHook {
        self.inner.release_hook(kind)
    }

    fn create_buffer(&mut self, name: &str, usage: BufferUsage, size: u64) -> RenderResult<BufferHandle> {
        self.inner.create_buffer(name, usage, size)
    }

    fn write_buffer(&mut self, buffer: ResourceId, offset: u64, data: &[u8]) -> RenderResult<()> {
        self.check(FailOn::WriteBuffer)?;
        self.inner.write_buffer(buffer, offset, data)
    }

    fn create_vertex_array(
        &mut self,
        name: &str,
        buffer: ResourceId,
        format: VertexFormat,
        offset: u64,
    ) -> RenderResult<VertexArrayHandle> {
        self.inner.create_vertex_array(name, buffer, format, offset)
    }

    fn activate_vertex_array(&mut self, vertex_array: Option<ResourceId>) -> RenderResult<()> {
        self.inner.activate_vertex_array(vertex_array)
    }

    fn create_shader(&mut self, name: &str, stage: ShaderStage) -> RenderResult<ShaderHandle> {
        self.check(FailOn::CreateShader)?;
        self.inner.create_shader(name, stage)
    }

    fn compile_shader(&mut self, shader: ResourceId, source: &str) -> RenderResult<()> {
        self.inner.compile_shader(shader, source)
    }

    fn create_program(&mut self, name: &str) -> RenderResult<ProgramHandle> {
        self.check(FailOn::CreateProgram)?;
        self.inner.create_program(name)
    }

    fn attach_shader(&mut self, program: ResourceId, shader: ResourceId) -> RenderResult<()> {
        self.check(FailOn::AttachShader)?;
        self.inner.attach_shader(program, shader)
    }

    fn link_program(&mut self, program: ResourceId) -> RenderResult<()> {
        self.inner.link_program(program)
    }

    fn validate_program(&mut self, program: ResourceId) -> RenderResult<()> {
        self.inner.validate_program(program)
    }

    fn activate_program(&mut self, program: Option<ResourceId>) -> RenderResult<()> {
        self.inner.activate_program(program)
    }

    fn uniform_location(&self, program: ResourceId, name: &str) -> Option<UniformLocation> {
        self.inner.uniform_location(program, name)
    }

    fn set_uniform(
        &mut self,
        program: ResourceId,
        location: UniformLocation,
        value: UniformValue,
    ) -> RenderResult<()> {
        self.inner.set_uniform(program, location, value)
    }

    fn uniform_block_index(&self, program: ResourceId, name: &str) -> Option<u32> {
        self.inner.uniform_block_index(program, name)
    }

    fn bind_uniform_block(&mut self, program: ResourceId, block: u32, binding: u32) -> RenderResult<()> {
        self.inner.bind_uniform_block(program, block, binding)
    }

    fn create_texture(&mut self, name: &str, data: &TextureData) -> RenderResult<TextureHandle> {
        self.inner.create_texture(name, data)
    }

    fn set_texture_params(&mut self, texture: ResourceId, params: TextureParams) -> RenderResult<()> {
        self.inner.set_texture_params(texture, params)
    }

    fn create_framebuffer(&mut self, name: &str, desc: &FramebufferDesc) -> RenderResult<FramebufferHandle> {
        self.inner.create_framebuffer(name, desc)
    }

    fn set_attachment_params(
        &mut self,
        framebuffer: ResourceId,
        attachment: Attachment,
        params: TextureParams,
    ) -> RenderResult<()> {
        self.inner.set_attachment_params(framebuffer, attachment, params)
    }

    fn live_count(&self, kind: ResourceKind) -> usize {
        self.inner.live_count(kind)
    }
}
