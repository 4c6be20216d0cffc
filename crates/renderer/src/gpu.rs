//! wgpu backend. Objects are real GPU resources; GLSL goes through the naga
//! front end. Program bookkeeping (link rules, uniform locations, block
//! bindings) is shared with the headless backend, since wgpu has no program
//! objects of its own.

use std::borrow::Cow;

use asset::{ShaderStage, TextureData, VertexFormat};
use corelib::{
    BufferHandle, FramebufferHandle, Handle, LibraryEpoch, ProgramHandle, ReleaseHook, ResourceId,
    ResourceKind, ResourceType, ShaderHandle, TextureHandle, VertexArrayHandle,
};
use wgpu::{
    AddressMode, Backends, BufferDescriptor, BufferUsages, Device, DeviceDescriptor, ErrorFilter,
    Extent3d, Features, Instance, InstanceDescriptor, Origin3d, PowerPreference, Queue,
    SamplerDescriptor, ShaderModuleDescriptor, ShaderSource, TexelCopyBufferLayout,
    TexelCopyTextureInfo, TextureAspect, TextureDescriptor, TextureDimension, TextureFormat,
    TextureUsages, TextureViewDescriptor,
};

use crate::device::{
    Attachment, BufferUsage, ColorType, DepthType, DeviceLimits, FilterMode, FramebufferDesc,
    RenderDevice, RenderError, RenderResult, TextureParams, UniformLocation, UniformValue,
    VertexArrayInfo, WrapMode,
};
use crate::program::{AttachedShader, ProgramRecord};
use crate::reflect::ShaderReflection;
use crate::registry::{self, Registry, SharedRegistry, Tracked};

const BACKEND: &str = "wgpu";

struct GpuBuffer {
    name: String,
    /// Size requested by the caller; the allocation is rounded up to the copy alignment.
    size: u64,
    buffer: wgpu::Buffer,
    /// CPU copy so unaligned writes can be widened to aligned ones.
    shadow: Vec<u8>,
}

struct GpuShader {
    name: String,
    stage: ShaderStage,
    compiled: bool,
    reflection: ShaderReflection,
    #[allow(dead_code)]
    module: Option<wgpu::ShaderModule>,
}

struct GpuTexture {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    #[allow(dead_code)]
    view: wgpu::TextureView,
    #[allow(dead_code)]
    sampler: wgpu::Sampler,
    params: TextureParams,
}

struct GpuFramebuffer {
    name: String,
    color: Vec<GpuTexture>,
    depth: Option<GpuTexture>,
}

enum GpuObject {
    Buffer(GpuBuffer),
    VertexArray(VertexArrayInfo),
    Shader(GpuShader),
    Program(ProgramRecord),
    Texture(GpuTexture),
    Framebuffer(GpuFramebuffer),
}

impl Tracked for GpuObject {
    fn kind(&self) -> ResourceKind {
        match self {
            GpuObject::Buffer(_) => ResourceKind::Buffer,
            GpuObject::VertexArray(_) => ResourceKind::VertexArray,
            GpuObject::Shader(_) => ResourceKind::Shader,
            GpuObject::Program(_) => ResourceKind::Program,
            GpuObject::Texture(_) => ResourceKind::Texture,
            GpuObject::Framebuffer(_) => ResourceKind::Framebuffer,
        }
    }
}

macro_rules! gpu_record {
    (mut $reg:expr, $id:expr, $variant:ident, $kind:ident) => {
        match $reg.get_mut($id, ResourceKind::$kind)? {
            GpuObject::$variant(r) => r,
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
            GpuObject::$variant(r) => r,
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

pub struct WgpuDevice {
    device: Device,
    queue: Queue,
    adapter_name: String,
    registry: SharedRegistry<GpuObject>,
    epoch: LibraryEpoch,
    active_vertex_array: Option<ResourceId>,
    active_program: Option<ResourceId>,
}

impl WgpuDevice {
    /// Blocking constructor for synchronous loaders.
    pub fn new(backends: Backends) -> RenderResult<Self> {
        pollster::block_on(Self::new_async(backends))
    }

    pub async fn new_async(backends: Backends) -> RenderResult<Self> {
        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Device(format!("no suitable GPU adapter: {e}")))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("Demoforge Device"),
                required_features: Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| RenderError::Device(format!("request_device failed: {e}")))?;

        log::info!("wgpu device ready on '{adapter_name}' ({:?})", adapter.get_info().backend);
        Ok(Self {
            device,
            queue,
            adapter_name,
            registry: Registry::shared(),
            epoch: LibraryEpoch::new(),
            active_vertex_array: None,
            active_program: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn active_program(&self) -> Option<ResourceId> {
        self.active_program
    }

    fn issue<T: ResourceType>(&self, id: ResourceId, name: &str) -> Handle<T> {
        Handle::new(id, name, self.release_hook(T::KIND))
    }

    /// Run `f` inside a validation error scope.
    fn scoped<T>(&self, f: impl FnOnce(&Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    fn create_sampler(&self, label: &str, params: TextureParams) -> wgpu::Sampler {
        let filter = match params.filter {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        };
        let wrap = |w: WrapMode| match w {
            WrapMode::Repeat => AddressMode::Repeat,
            WrapMode::Clamp => AddressMode::ClampToEdge,
        };
        self.device.create_sampler(&SamplerDescriptor {
            label: Some(label),
            address_mode_u: wrap(params.wrap_u),
            address_mode_v: wrap(params.wrap_v),
            mag_filter: filter,
            min_filter: filter,
            ..Default::default()
        })
    }

    fn create_target(&self, label: &str, format: TextureFormat, width: u32, height: u32) -> RenderResult<GpuTexture> {
        let texture = self
            .scoped(|d| {
                d.create_texture(&TextureDescriptor {
                    label: Some(label),
                    size: Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: TextureDimension::D2,
                    format,
                    usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
            })
            .map_err(RenderError::Device)?;
        let view = texture.create_view(&TextureViewDescriptor::default());
        let params = TextureParams::default();
        Ok(GpuTexture {
            sampler: self.create_sampler(label, params),
            texture,
            view,
            params,
        })
    }
}

fn naga_stage(stage: ShaderStage) -> Option<wgpu::naga::ShaderStage> {
    match stage {
        ShaderStage::Vertex => Some(wgpu::naga::ShaderStage::Vertex),
        ShaderStage::Fragment => Some(wgpu::naga::ShaderStage::Fragment),
        ShaderStage::Geometry => None,
    }
}

fn color_format(color: ColorType) -> TextureFormat {
    match color {
        ColorType::Rgba8 => TextureFormat::Rgba8Unorm,
        ColorType::Rgba16 => TextureFormat::Rgba16Float,
    }
}

fn depth_format(depth: DepthType) -> TextureFormat {
    match depth {
        DepthType::Depth24Stencil8 => TextureFormat::Depth24PlusStencil8,
        DepthType::Depth32 => TextureFormat::Depth32Float,
    }
}

impl RenderDevice for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            max_uniform_block_size: u64::from(self.device.limits().max_uniform_buffer_binding_size),
        }
    }

    fn epoch(&self) -> &LibraryEpoch {
        &self.epoch
    }

    fn release_hook(&self, kind: ResourceKind) -> ReleaseHook {
        registry::release_hook(&self.registry, &self.epoch, kind)
    }

    fn create_buffer(&mut self, name: &str, usage: BufferUsage, size: u64) -> RenderResult<BufferHandle> {
        let usage_flags = match usage {
            BufferUsage::DrawData => BufferUsages::VERTEX | BufferUsages::INDEX,
            BufferUsage::Uniform => BufferUsages::UNIFORM,
        } | BufferUsages::COPY_DST;
        let padded = size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT;
        let buffer = self
            .scoped(|d| {
                d.create_buffer(&BufferDescriptor {
                    label: Some(name),
                    size: padded,
                    usage: usage_flags,
                    mapped_at_creation: false,
                })
            })
            .map_err(RenderError::Device)?;
        let shadow_len = usize::try_from(padded)
            .map_err(|_| RenderError::Device(format!("buffer '{name}' is too large")))?;
        let id = self.registry.lock().insert(GpuObject::Buffer(GpuBuffer {
            name: name.to_owned(),
            size,
            buffer,
            shadow: vec![0; shadow_len],
        }));
        Ok(self.issue(id, name))
    }

    fn write_buffer(&mut self, buffer: ResourceId, offset: u64, data: &[u8]) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        let b = gpu_record!(mut reg, buffer, Buffer, Buffer);
        let end = offset.checked_add(data.len() as u64).filter(|&end| end <= b.size);
        let Some(end) = end else {
            return Err(RenderError::BufferOverflow {
                name: b.name.clone(),
                offset,
                len: data.len() as u64,
                size: b.size,
            });
        };
        b.shadow[offset as usize..end as usize].copy_from_slice(data);

        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        let start = offset / align * align;
        let stop = end.div_ceil(align) * align;
        if stop > start {
            self.queue
                .write_buffer(&b.buffer, start, &b.shadow[start as usize..stop as usize]);
        }
        Ok(())
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
            gpu_record!(reg, buffer, Buffer, Buffer);
            reg.insert(GpuObject::VertexArray(VertexArrayInfo {
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
            gpu_record!(reg, id, VertexArray, VertexArray);
        }
        self.active_vertex_array = vertex_array;
        Ok(())
    }

    fn create_shader(&mut self, name: &str, stage: ShaderStage) -> RenderResult<ShaderHandle> {
        let id = self.registry.lock().insert(GpuObject::Shader(GpuShader {
            name: name.to_owned(),
            stage,
            compiled: false,
            reflection: ShaderReflection::default(),
            module: None,
        }));
        Ok(self.issue(id, name))
    }

    fn compile_shader(&mut self, shader: ResourceId, source: &str) -> RenderResult<()> {
        let (name, stage) = {
            let reg = self.registry.lock();
            let s = gpu_record!(reg, shader, Shader, Shader);
            (s.name.clone(), s.stage)
        };
        let naga = naga_stage(stage).ok_or(RenderError::UnsupportedStage {
            stage,
            backend: BACKEND,
        })?;
        let module = self
            .scoped(|d| {
                d.create_shader_module(ShaderModuleDescriptor {
                    label: Some(name.as_str()),
                    source: ShaderSource::Glsl {
                        shader: Cow::Borrowed(source),
                        stage: naga,
                        defines: Default::default(),
                    },
                })
            })
            .map_err(|log| RenderError::CompileFailed {
                name: name.clone(),
                log,
            })?;

        let mut reg = self.registry.lock();
        let s = gpu_record!(mut reg, shader, Shader, Shader);
        s.module = Some(module);
        s.reflection = ShaderReflection::scan(source);
        s.compiled = true;
        Ok(())
    }

    fn create_program(&mut self, name: &str) -> RenderResult<ProgramHandle> {
        let id = self
            .registry
            .lock()
            .insert(GpuObject::Program(ProgramRecord::new(name)));
        Ok(self.issue(id, name))
    }

    fn attach_shader(&mut self, program: ResourceId, shader: ResourceId) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        let s = gpu_record!(reg, shader, Shader, Shader);
        let attached = AttachedShader {
            shader,
            name: s.name.clone(),
            stage: s.stage,
            compiled: s.compiled,
            reflection: s.reflection.clone(),
        };
        gpu_record!(mut reg, program, Program, Program).attach(attached)
    }

    fn link_program(&mut self, program: ResourceId) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        gpu_record!(mut reg, program, Program, Program).link()
    }

    fn validate_program(&mut self, program: ResourceId) -> RenderResult<()> {
        let active = self.active_vertex_array.is_some();
        let mut reg = self.registry.lock();
        gpu_record!(mut reg, program, Program, Program).validate(active)
    }

    fn activate_program(&mut self, program: Option<ResourceId>) -> RenderResult<()> {
        if let Some(id) = program {
            let reg = self.registry.lock();
            gpu_record!(reg, id, Program, Program);
        }
        self.active_program = program;
        Ok(())
    }

    fn uniform_location(&self, program: ResourceId, name: &str) -> Option<UniformLocation> {
        match self.registry.lock().get(program, ResourceKind::Program).ok()? {
            GpuObject::Program(p) => p.uniform_location(name),
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
        gpu_record!(mut reg, program, Program, Program).set_uniform(location, value)
    }

    fn uniform_block_index(&self, program: ResourceId, name: &str) -> Option<u32> {
        match self.registry.lock().get(program, ResourceKind::Program).ok()? {
            GpuObject::Program(p) => p.uniform_block_index(name),
            _ => None,
        }
    }

    fn bind_uniform_block(&mut self, program: ResourceId, block: u32, binding: u32) -> RenderResult<()> {
        let mut reg = self.registry.lock();
        gpu_record!(mut reg, program, Program, Program).bind_uniform_block(block, binding)
    }

    fn create_texture(&mut self, name: &str, data: &TextureData) -> RenderResult<TextureHandle> {
        if !data.is_valid() {
            return Err(RenderError::Device(format!(
                "texture '{name}' has inconsistent pixel data"
            )));
        }
        let size = Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = self
            .scoped(|d| {
                d.create_texture(&TextureDescriptor {
                    label: Some(name),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: TextureDimension::D2,
                    format: TextureFormat::Rgba8UnormSrgb,
                    usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .map_err(RenderError::Device)?;
        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            &data.data,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(data.width * data.bytes_per_pixel()),
                rows_per_image: Some(data.height),
            },
            size,
        );
        let view = texture.create_view(&TextureViewDescriptor::default());
        let params = TextureParams::default();
        let sampler = self.create_sampler(name, params);
        let id = self.registry.lock().insert(GpuObject::Texture(GpuTexture {
            texture,
            view,
            sampler,
            params,
        }));
        Ok(self.issue(id, name))
    }

    fn set_texture_params(&mut self, texture: ResourceId, params: TextureParams) -> RenderResult<()> {
        let sampler = self.create_sampler("texture sampler", params);
        let mut reg = self.registry.lock();
        let t = gpu_record!(mut reg, texture, Texture, Texture);
        t.sampler = sampler;
        t.params = params;
        Ok(())
    }

    fn create_framebuffer(&mut self, name: &str, desc: &FramebufferDesc) -> RenderResult<FramebufferHandle> {
        if desc.width == 0 || desc.height == 0 || (desc.color_targets == 0 && desc.depth.is_none()) {
            return Err(RenderError::Device(format!(
                "framebuffer '{name}' has no storage ({desc:?})"
            )));
        }
        let color = (0..desc.color_targets)
            .map(|i| {
                self.create_target(
                    &format!("{name}:color{i}"),
                    color_format(desc.color_type),
                    desc.width,
                    desc.height,
                )
            })
            .collect::<RenderResult<Vec<_>>>()?;
        let depth = desc
            .depth
            .map(|d| self.create_target(&format!("{name}:depth"), depth_format(d), desc.width, desc.height))
            .transpose()?;
        log::debug!("Framebuffer '{name}': {} color target(s) on '{}'", color.len(), self.adapter_name);

        let id = self.registry.lock().insert(GpuObject::Framebuffer(GpuFramebuffer {
            name: name.to_owned(),
            color,
            depth,
        }));
        Ok(self.issue(id, name))
    }

    fn set_attachment_params(
        &mut self,
        framebuffer: ResourceId,
        attachment: Attachment,
        params: TextureParams,
    ) -> RenderResult<()> {
        let sampler = self.create_sampler("attachment sampler", params);
        let mut reg = self.registry.lock();
        let f = gpu_record!(mut reg, framebuffer, Framebuffer, Framebuffer);
        let target = match attachment {
            Attachment::Color(i) => f.color.get_mut(i as usize),
            Attachment::Depth => f.depth.as_mut(),
        };
        let Some(target) = target else {
            return Err(RenderError::NoAttachment {
                name: f.name.clone(),
                attachment,
            });
        };
        target.sampler = sampler;
        target.params = params;
        Ok(())
    }

    fn live_count(&self, kind: ResourceKind) -> usize {
        self.registry.lock().count(kind)
    }
}
