//! In-memory backend. Keeps every object as plain data so loaders can run
//! without a GPU and tests can inspect exactly what was created.

use asset::{ShaderStage, TextureData, VertexFormat};
use corelib::{
    BufferHandle, FramebufferHandle, Handle, LibraryEpoch, ProgramHandle, ReleaseHook, ResourceId,
    ResourceKind, ResourceType, ShaderHandle, TextureHandle, VertexArrayHandle,
};

use crate::device::{
    Attachment, BufferUsage, DeviceLimits, FramebufferDesc, RenderDevice, RenderError,
    RenderResult, TextureParams, UniformLocation, UniformValue, VertexArrayInfo,
};
use crate::program::{AttachedShader, ProgramRecord, ProgramStatus};
use crate::reflect::ShaderReflection;
use crate::registry::{self, Registry, SharedRegistry, Tracked};

/// Uniform block size limit reported by default (GL's usual 64 KiB).
pub const DEFAULT_MAX_UNIFORM_BLOCK_SIZE: u64 = 64 * 1024;

struct BufferRecord {
    name: String,
    usage: BufferUsage,
    data: Vec<u8>,
}

struct ShaderRecord {
    name: String,
    stage: ShaderStage,
    compiled: bool,
    reflection: ShaderReflection,
}

struct TextureRecord {
    width: u32,
    height: u32,
    params: TextureParams,
}

struct FramebufferRecord {
    name: String,
    desc: FramebufferDesc,
    color: Vec<TextureParams>,
    depth: Option<TextureParams>,
}

enum Object {
    Buffer(BufferRecord),
    VertexArray(VertexArrayInfo),
    Shader(ShaderRecord),
    Program(ProgramRecord),
    Texture(TextureRecord),
    Framebuffer(FramebufferRecord),
}

impl Tracked for Object {
    fn kind(&self) -> ResourceKind {
        match self {
            Object::Buffer(_) => ResourceKind::Buffer,
            Object::VertexArray(_) => ResourceKind::VertexArray,
            Object::Shader(_) => ResourceKind::Shader,
            Object::Program(_) => ResourceKind::Program,
            Object::Texture(_) => ResourceKind::Texture,
            Object::Framebuffer(_) => ResourceKind::Framebuffer,
        }
    }
}

/// Pull the `$variant` payload out of a registry lookup.
macro_rules! record {
    (mut $reg:expr, $id:expr, $variant:ident, $kind:ident) => {
        match $reg.get_mut($id, ResourceKind::$kind)? {
            Object::$variant(r) => r,
            other => {
                return Err(RenderError::WrongKind {
                    id: $id,
                    expected: ResourceKind::$kind,
                    actual: other.kind(),
                })
            }
        }
    };
    ($reg:expr, $id:expr, $variant:ident, $kind:ident) => {
        match $reg.get($id, ResourceKind::$kind)? {
            Object::$variant(r) => r,
            other => {
                return Err(RenderError::WrongKind {
                    id: $id,
                    expected: ResourceKind::$kind,
                    actual: other.kind(),
                })
            }
        }
    };
}

pub struct HeadlessDevice {
    registry: SharedRegistry<Object>,
    epoch: LibraryEpoch,
    limits: DeviceLimits,
    active_vertex_array: Option<ResourceId>,
    active_program: Option<ResourceId>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits {
            max_uniform_block_size: DEFAULT_MAX_UNIFORM_BLOCK_SIZE,
        })
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        log::debug!("Headless device created ({limits:?})");
        Self {
            registry: Registry::shared(),
            epoch: LibraryEpoch::new(),
            limits,
            active_vertex_array: None,
            active_program: None,
        }
    }

    fn issue<T: ResourceType>(&self, id: ResourceId, name: &str) -> Handle<T> {
        Handle::new(id, name, self.release_hook(T::KIND))
    }

    // ---- inspection ----

    pub fn is_live(&self, id: ResourceId) -> bool {
        self.registry.lock().contains(id)
    }

    pub fn active_vertex_array(&self) -> Option<ResourceId> {
        self.active_vertex_array
    }

    pub fn active_program(&self) -> Option<ResourceId> {
        self.active_program
    }

    pub fn buffer_data(&self, id: ResourceId) -> Option<Vec<u8>> {
        match self.registry.lock().get(id, ResourceKind::Buffer).ok()? {
            Object::Buffer(b) => Some(b.data.clone()),
            _ => None,
        }
    }

    pub fn buffer_usage(&self, id: ResourceId) -> Option<BufferUsage> {
        match self.registry.lock().get(id, ResourceKind::Buffer).ok()? {
            Object::Buffer(b) => Some(b.usage),
            _ => None,
        }
    }

    pub fn vertex_array(&self, id: ResourceId) -> Option<VertexArrayInfo> {
        match self.registry.lock().get(id, ResourceKind::VertexArray).ok()? {
            Object::VertexArray(v) => Some(*v),
            _ => None,
        }
    }

    pub fn program_status(&self, id: ResourceId) -> Option<ProgramStatus> {
        match self.registry.lock().get(id, ResourceKind::Program).ok()? {
            Object::Program(p) => Some(p.status()),
            _ => None,
        }
    }

    pub fn uniform_value(&self, program: ResourceId, name: &str) -> Option<UniformValue> {
        match self.registry.lock().get(program, ResourceKind::Program).ok()? {
            Object::Program(p) => p.uniform(name)?.value,
            _ => None,
        }
    }

    pub fn uniform_block_binding(&self, program: ResourceId, name: &str) -> Option<u32> {
        match self.registry.lock().get(program, ResourceKind::Program).ok()? {
            Object::Program(p) => p.block(name)?.binding,
            _ => None,
        }
    }

    pub fn texture_params(&self, id: ResourceId) -> Option<TextureParams> {
        match self.registry.lock().get(id, ResourceKind::Texture).ok()? {
            Object::Texture(t) => Some(t.params),
            _ => None,
        }
    }

    pub fn texture_size(&self, id: ResourceId) -> Option<(u32, u32)> {
        match self.registry.lock().get(id, ResourceKind::Texture).ok()? {
            Object::Texture(t) => Some((t.width, t.height)),
            _ => None,
        }
    }

    pub fn framebuffer_desc(&self, id: ResourceId) -> Option<FramebufferDesc> {
        match self.registry.lock().get(id, ResourceKind::Framebuffer).ok()? {
            Object::Framebuffer(f) => Some(f.desc),
            _ => None,
        }
    }

    pub fn attachment_params(&self, id: ResourceId, attachment: Attachment) -> Option<TextureParams> {
        match self.registry.lock().get(id, ResourceKind::Framebuffer).ok()? {
            Object::Framebuffer(f) => match attachment {
                Attachment::Color(i) => f.color.get(i as usize).copied(),
                Attachment::Depth => f.depth,
            },
            _ => None,
        }
    }
}

/// Cheap stand-in for a compiler front end: a version directive, balanced
/// delimiters and an entry point.
fn check_source(source: &str) -> Result<(), String> {
    if !source.trim_start().starts_with("#version") {
        return Err("missing #version directive".into());
    }
    let mut stack = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        let code = line.split("//").next().unwrap_or("");
        for c in code.chars() {
            match c {
                '{' | '(' | '[' => stack.push(c),
                '}' | ')' | ']' => {
                    let open = match c {
                        '}' => '{',
                        ')' => '(',
                        _ => '[',
                    };
                    if stack.pop() != Some(open) {
                        return Err(format!("{}: unbalanced '{c}'", line_no + 1));
                    }
                }
                _ => {}
            }
        }
    }
    if let Some(open) = stack.last() {
        return Err(format!("unclosed '{open}'"));
    }
    if !source.contains("void main") {
        return Err("no entry point 'main'".into());
    }
    Ok(())
}

impl RenderDevice for HeadlessDevice {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn epoch(&self) -> &LibraryEpoch {
        &self.epoch
    }

    fn release_hook(&self, kind: ResourceKind) -> ReleaseHook {
        registry::release_hook(&self.registry, &self.epoch, kind)
    }

    fn create_buffer(&mut self, name: &str, usage: BufferUsage, size: u64) -> RenderResult<BufferHandle> {
        let size = usize::try_from(size)
            .map_err(|_| RenderError::Device(format!("buffer '{name}' is too large ({size} bytes)")))?;
        let id = self.registry.lock().insert(Object::Buffer(BufferRecord {
            name: name.to_owned(),
            usage,
            data: vec![0; size],
        }));
        Ok(self.issue(id, name))
    }

    fn write_buffer(&mut self, buffer: ResourceId, offset: u64, data: &[u8]) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        let b = record!(mut reg, buffer, Buffer, Buffer);
        let size = b.data.len() as u64;
        let end = offset.checked_add(data.len() as u64);
        match end {
            Some(end) if end <= size => {
                b.data[offset as usize..end as usize].copy_from_slice(data);
                Ok(())
            }
            _ => Err(RenderError::BufferOverflow {
                name: b.name.clone(),
                offset,
                len: data.len() as u64,
                size,
            }),
        }
    }

    fn create_vertex_array(
        &mut self,
        name: &str,
        buffer: ResourceId,
        format: VertexFormat,
        offset: u64,
    ) -> RenderResult<VertexArrayHandle> {
        let id = {
            let mut reg = self.registry.lock();
            record!(reg, buffer, Buffer, Buffer);
            reg.insert(Object::VertexArray(VertexArrayInfo {
                buffer,
                format,
                offset,
            }))
        };
        Ok(self.issue(id, name))
    }

    fn activate_vertex_array(&mut self, vertex_array: Option<ResourceId>) -> RenderResult<()> {
        if let Some(id) = vertex_array {
            let reg = self.registry.lock();
            record!(reg, id, VertexArray, VertexArray);
        }
        self.active_vertex_array = vertex_array;
        Ok(())
    }

    fn create_shader(&mut self, name: &str, stage: ShaderStage) -> RenderResult<ShaderHandle> {
        let id = self.registry.lock().insert(Object::Shader(ShaderRecord {
            name: name.to_owned(),
            stage,
            compiled: false,
            reflection: ShaderReflection::default(),
        }));
        Ok(self.issue(id, name))
    }

    fn compile_shader(&mut self, shader: ResourceId, source: &str) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        let s = record!(mut reg, shader, Shader, Shader);
        s.compiled = false;
        check_source(source).map_err(|log| RenderError::CompileFailed {
            name: s.name.clone(),
            log,
        })?;
        s.reflection = ShaderReflection::scan(source);
        s.compiled = true;
        Ok(())
    }

    fn create_program(&mut self, name: &str) -> RenderResult<ProgramHandle> {
        let id = self
            .registry
            .lock()
            .insert(Object::Program(ProgramRecord::new(name)));
        Ok(self.issue(id, name))
    }

    fn attach_shader(&mut self, program: ResourceId, shader: ResourceId) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        let s = record!(reg, shader, Shader, Shader);
        let attached = AttachedShader {
            shader,
            name: s.name.clone(),
            stage: s.stage,
            compiled: s.compiled,
            reflection: s.reflection.clone(),
        };
        record!(mut reg, program, Program, Program).attach(attached)
    }

    fn link_program(&mut self, program: ResourceId) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        record!(mut reg, program, Program, Program).link()
    }

    fn validate_program(&mut self, program: ResourceId) -> RenderResult<()> {
        let active = self.active_vertex_array.is_some();
        let mut reg = self.registry.lock();
        record!(mut reg, program, Program, Program).validate(active)
    }

    fn activate_program(&mut self, program: Option<ResourceId>) -> RenderResult<()> {
        if let Some(id) = program {
            let reg = self.registry.lock();
            record!(reg, id, Program, Program);
        }
        self.active_program = program;
        Ok(())
    }

    fn uniform_location(&self, program: ResourceId, name: &str) -> Option<UniformLocation> {
        match self.registry.lock().get(program, ResourceKind::Program).ok()? {
            Object::Program(p) => p.uniform_location(name),
            _ => None,
        }
    }

    fn set_uniform(
        &mut self,
        program: ResourceId,
        location: UniformLocation,
        value: UniformValue,
    ) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        record!(mut reg, program, Program, Program).set_uniform(location, value)
    }

    fn uniform_block_index(&self, program: ResourceId, name: &str) -> Option<u32> {
        match self.registry.lock().get(program, ResourceKind::Program).ok()? {
            Object::Program(p) => p.uniform_block_index(name),
            _ => None,
        }
    }

    fn bind_uniform_block(&mut self, program: ResourceId, block: u32, binding: u32) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        record!(mut reg, program, Program, Program).bind_uniform_block(block, binding)
    }

    fn create_texture(&mut self, name: &str, data: &TextureData) -> RenderResult<TextureHandle> {
        if !data.is_valid() {
            return Err(RenderError::Device(format!(
                "texture '{name}' has inconsistent pixel data"
            )));
        }
        let id = self.registry.lock().insert(Object::Texture(TextureRecord {
            width: data.width,
            height: data.height,
            params: TextureParams::default(),
        }));
        Ok(self.issue(id, name))
    }

    fn set_texture_params(&mut self, texture: ResourceId, params: TextureParams) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        let t = record!(mut reg, texture, Texture, Texture);
        t.params = params;
        Ok(())
    }

    fn create_framebuffer(&mut self, name: &str, desc: &FramebufferDesc) -> RenderResult<FramebufferHandle> {
        if desc.width == 0 || desc.height == 0 || (desc.color_targets == 0 && desc.depth.is_none()) {
            return Err(RenderError::Device(format!(
                "framebuffer '{name}' has no storage ({desc:?})"
            )));
        }
        let id = self.registry.lock().insert(Object::Framebuffer(FramebufferRecord {
            name: name.to_owned(),
            desc: *desc,
            color: vec![TextureParams::default(); desc.color_targets as usize],
            depth: desc.depth.map(|_| TextureParams::default()),
        }));
        Ok(self.issue(id, name))
    }

    fn set_attachment_params(
        &mut self,
        framebuffer: ResourceId,
        attachment: Attachment,
        params: TextureParams,
    ) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        let f = record!(mut reg, framebuffer, Framebuffer, Framebuffer);
        let slot = match attachment {
            Attachment::Color(i) => f.color.get_mut(i as usize),
            Attachment::Depth => f.depth.as_mut(),
        };
        match slot {
            Some(slot) => {
                *slot = params;
                Ok(())
            }
            None => Err(RenderError::NoAttachment {
                name: f.name.clone(),
                attachment,
            }),
        }
    }

    fn live_count(&self, kind: ResourceKind) -> usize {
        self.registry.lock().count(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ColorType, DepthType, FilterMode, WrapMode};

    const VS: &str = "#version 450\nlayout(location = 0) in vec4 aPosition;\nuniform mat4 uMVP;\nvoid main() { gl_Position = uMVP * aPosition; }\n";
    const FS: &str = "#version 450\nuniform vec4 uColor;\nout vec4 rtFragColor;\nvoid main() { rtFragColor = uColor; }\n";

    #[test]
    fn buffer_writes_are_bounds_checked() {
        let mut dev = HeadlessDevice::new();
        let buf = dev.create_buffer("vbo", BufferUsage::DrawData, 8).unwrap();
        dev.write_buffer(buf.id(), 4, &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            dev.write_buffer(buf.id(), 5, &[0; 4]),
            Err(RenderError::BufferOverflow { .. })
        ));
        assert_eq!(dev.buffer_data(buf.id()).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn program_pipeline_end_to_end() {
        let mut dev = HeadlessDevice::new();
        let vs = dev.create_shader("vs", ShaderStage::Vertex).unwrap();
        let fs = dev.create_shader("fs", ShaderStage::Fragment).unwrap();
        dev.compile_shader(vs.id(), VS).unwrap();
        dev.compile_shader(fs.id(), FS).unwrap();

        let prog = dev.create_program("prog").unwrap();
        dev.attach_shader(prog.id(), vs.id()).unwrap();
        dev.attach_shader(prog.id(), fs.id()).unwrap();
        dev.link_program(prog.id()).unwrap();
        // nothing active yet
        assert!(dev.validate_program(prog.id()).is_err());

        let buf = dev.create_buffer("vbo", BufferUsage::DrawData, 64).unwrap();
        let vao = dev
            .create_vertex_array("vao", buf.id(), VertexFormat::POSITION, 0)
            .unwrap();
        dev.activate_vertex_array(Some(vao.id())).unwrap();
        dev.validate_program(prog.id()).unwrap();

        // shaders may go once the program is built
        assert!(vs.release().unwrap());
        assert!(fs.release().unwrap());
        assert_eq!(dev.live_count(ResourceKind::Shader), 0);

        let loc = dev.uniform_location(prog.id(), "uColor").unwrap();
        dev.set_uniform(prog.id(), loc, UniformValue::Vec4(corelib::Vec4::ONE))
            .unwrap();
        assert_eq!(
            dev.uniform_value(prog.id(), "uColor"),
            Some(UniformValue::Vec4(corelib::Vec4::ONE))
        );
        assert_eq!(
            dev.program_status(prog.id()),
            Some(ProgramStatus {
                linked: true,
                validated: true
            })
        );
    }

    #[test]
    fn bad_source_fails_to_compile_and_blocks_link() {
        let mut dev = HeadlessDevice::new();
        let vs = dev.create_shader("vs", ShaderStage::Vertex).unwrap();
        let err = dev
            .compile_shader(vs.id(), "#version 450\nvoid main() {")
            .unwrap_err();
        assert!(matches!(err, RenderError::CompileFailed { .. }));

        let prog = dev.create_program("prog").unwrap();
        dev.attach_shader(prog.id(), vs.id()).unwrap();
        assert!(matches!(
            dev.link_program(prog.id()),
            Err(RenderError::LinkFailed { .. })
        ));
    }

    #[test]
    fn stale_hooks_are_refused_until_refreshed() {
        let mut dev = HeadlessDevice::new();
        let tex = dev.create_texture("tex", &TextureData::checker(8)).unwrap();
        let mut other = dev.create_texture("tex2", &TextureData::checker(8)).unwrap();

        dev.epoch().advance();
        assert!(tex.release().is_err());
        assert!(dev.is_live(other.id()));

        other.refresh_hook(dev.release_hook(ResourceKind::Texture));
        let id = other.id();
        assert!(other.release().unwrap());
        assert!(!dev.is_live(id));
    }

    #[test]
    fn texture_and_attachment_params() {
        let mut dev = HeadlessDevice::new();
        let tex = dev.create_texture("tex", &TextureData::checker(4)).unwrap();
        assert_eq!(dev.texture_params(tex.id()), Some(TextureParams::default()));
        let linear = TextureParams::new(FilterMode::Linear, WrapMode::Repeat, WrapMode::Clamp);
        dev.set_texture_params(tex.id(), linear).unwrap();
        assert_eq!(dev.texture_params(tex.id()), Some(linear));

        let fbo = dev
            .create_framebuffer(
                "fbo",
                &FramebufferDesc {
                    color_targets: 2,
                    color_type: ColorType::Rgba16,
                    depth: Some(DepthType::Depth24Stencil8),
                    width: 4,
                    height: 4,
                },
            )
            .unwrap();
        dev.set_attachment_params(fbo.id(), Attachment::Color(1), TextureParams::LINEAR_CLAMP)
            .unwrap();
        assert!(
            dev.set_attachment_params(fbo.id(), Attachment::Color(2), TextureParams::LINEAR_CLAMP)
                .is_err()
        );
        assert_eq!(
            dev.attachment_params(fbo.id(), Attachment::Color(1)),
            Some(TextureParams::LINEAR_CLAMP)
        );
        assert_eq!(
            dev.attachment_params(fbo.id(), Attachment::Depth),
            Some(TextureParams::default())
        );
    }

    #[test]
    fn check_source_rules() {
        assert!(check_source(VS).is_ok());
        assert!(check_source("void main() {}").is_err());
        assert!(check_source("#version 450\nvoid helper() {}").is_err());
        assert!(check_source("#version 450\nvoid main() { f(]; }").is_err());
    }
}
