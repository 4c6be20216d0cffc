//! The populated demo state: every handle the loaders create, keyed by slot.

use std::collections::BTreeMap;

use asset::{IndexFormat, Primitive, VertexFormat};
use corelib::{
    BufferHandle, FramebufferHandle, Handle, ProgramHandle, ResourceId, ResourceType,
    TextureHandle, VertexArrayHandle,
};
use renderer::UniformLocation;

use crate::report::LoadReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DrawableSlot {
    Axes,
    Grid,
    UnitPlaneZ,
    UnitBox,
    UnitSphere,
    UnitCylinder,
    UnitCapsule,
    UnitTorus,
    UnitCone,
    Teapot,
}

impl DrawableSlot {
    pub const ALL: [DrawableSlot; 10] = [
        DrawableSlot::Axes,
        DrawableSlot::Grid,
        DrawableSlot::UnitPlaneZ,
        DrawableSlot::UnitBox,
        DrawableSlot::UnitSphere,
        DrawableSlot::UnitCylinder,
        DrawableSlot::UnitCapsule,
        DrawableSlot::UnitTorus,
        DrawableSlot::UnitCone,
        DrawableSlot::Teapot,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DrawableSlot::Axes => "draw:axes",
            DrawableSlot::Grid => "draw:grid",
            DrawableSlot::UnitPlaneZ => "draw:unit-plane-z",
            DrawableSlot::UnitBox => "draw:unit-box",
            DrawableSlot::UnitSphere => "draw:unit-sphere",
            DrawableSlot::UnitCylinder => "draw:unit-cylinder",
            DrawableSlot::UnitCapsule => "draw:unit-capsule",
            DrawableSlot::UnitTorus => "draw:unit-torus",
            DrawableSlot::UnitCone => "draw:unit-cone",
            DrawableSlot::Teapot => "draw:teapot",
        }
    }

    /// Vertex layout the slot's geometry is stored with.
    pub fn vertex_array(self) -> VertexArraySlot {
        match self {
            DrawableSlot::Axes => VertexArraySlot::PositionColor,
            DrawableSlot::Grid => VertexArraySlot::Position,
            DrawableSlot::Teapot => VertexArraySlot::TangentBasisTexcoord,
            _ => VertexArraySlot::PositionNormalTexcoord,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexArraySlot {
    PositionColor,
    Position,
    PositionNormalTexcoord,
    TangentBasisTexcoord,
}

impl VertexArraySlot {
    pub const ALL: [VertexArraySlot; 4] = [
        VertexArraySlot::PositionColor,
        VertexArraySlot::Position,
        VertexArraySlot::PositionNormalTexcoord,
        VertexArraySlot::TangentBasisTexcoord,
    ];

    pub fn format(self) -> VertexFormat {
        match self {
            VertexArraySlot::PositionColor => VertexFormat::POSITION_COLOR,
            VertexArraySlot::Position => VertexFormat::POSITION,
            VertexArraySlot::PositionNormalTexcoord => VertexFormat::POSITION_NORMAL_TEXCOORD,
            VertexArraySlot::TangentBasisTexcoord => VertexFormat::TANGENT_BASIS_TEXCOORD,
        }
    }

    pub fn for_format(format: VertexFormat) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.format() == format)
    }

    pub fn name(self) -> &'static str {
        match self {
            VertexArraySlot::PositionColor => "vao:pos+col",
            VertexArraySlot::Position => "vao:pos",
            VertexArraySlot::PositionNormalTexcoord => "vao:pos+nrm+tc",
            VertexArraySlot::TangentBasisTexcoord => "vao:tb+tc",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramSlot {
    Transform,
    TransformInstanced,
    DrawColorUnif,
    DrawColorAttrib,
    DrawColorUnifInstanced,
    DrawColorAttribInstanced,
    DrawTexture,
    DrawTextureInstanced,
    DrawLambert,
    DrawLambertInstanced,
    DrawPhong,
    DrawPhongInstanced,
    DrawTangentBasis,
    DrawTangentBasisInstanced,
    DrawPhongShadow,
    DrawPhongShadowInstanced,
    PostBright,
    PostBlur,
    PostBlend,
}

impl ProgramSlot {
    pub fn name(self) -> &'static str {
        match self {
            ProgramSlot::Transform => "prog:transform",
            ProgramSlot::TransformInstanced => "prog:transform-inst",
            ProgramSlot::DrawColorUnif => "prog:draw-col-unif",
            ProgramSlot::DrawColorAttrib => "prog:draw-col-attr",
            ProgramSlot::DrawColorUnifInstanced => "prog:draw-col-unif-inst",
            ProgramSlot::DrawColorAttribInstanced => "prog:draw-col-attr-inst",
            ProgramSlot::DrawTexture => "prog:draw-tex",
            ProgramSlot::DrawTextureInstanced => "prog:draw-tex-inst",
            ProgramSlot::DrawLambert => "prog:draw-Lambert",
            ProgramSlot::DrawLambertInstanced => "prog:draw-Lambert-inst",
            ProgramSlot::DrawPhong => "prog:draw-Phong",
            ProgramSlot::DrawPhongInstanced => "prog:draw-Phong-inst",
            ProgramSlot::DrawTangentBasis => "prog:draw-tb",
            ProgramSlot::DrawTangentBasisInstanced => "prog:draw-tb-inst",
            ProgramSlot::DrawPhongShadow => "prog:draw-Phong-shadow",
            ProgramSlot::DrawPhongShadowInstanced => "prog:draw-Phong-shadow-inst",
            ProgramSlot::PostBright => "prog:post-bright",
            ProgramSlot::PostBlur => "prog:post-blur",
            ProgramSlot::PostBlend => "prog:post-blend",
        }
    }

    /// Full-screen passes drawn with the fixed quad transform.
    pub fn is_post_process(self) -> bool {
        matches!(
            self,
            ProgramSlot::PostBright | ProgramSlot::PostBlur | ProgramSlot::PostBlend
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UniformBufferSlot {
    Light,
    Transform,
}

impl UniformBufferSlot {
    pub const ALL: [UniformBufferSlot; 2] = [UniformBufferSlot::Light, UniformBufferSlot::Transform];

    pub fn name(self) -> &'static str {
        match self {
            UniformBufferSlot::Light => "ubo:light",
            UniformBufferSlot::Transform => "ubo:transform",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    EarthDiffuse,
    EarthSpecular,
    EarthNormal,
    EarthHeight,
    MarsDiffuse,
    MarsSpecular,
    MarsNormal,
    MarsHeight,
    StoneDiffuse,
    StoneNormal,
    StoneHeight,
    SunDiffuse,
    SkyClouds,
    SkyWater,
    RampDiffuse,
    RampSpecular,
    TestSprite,
    Checker,
}

/// Sampling group a texture belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureCategory {
    Material,
    Skybox,
    Ramp,
    Sprite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FramebufferSlot {
    Scene,
    Composite,
    Shadow,
    BrightHalf,
    BlurHorizontalHalf,
    BlurVerticalHalf,
    BrightQuarter,
    BlurHorizontalQuarter,
    BlurVerticalQuarter,
    BrightEighth,
    BlurHorizontalEighth,
    BlurVerticalEighth,
}

/// Draw parameters into the shared scene buffer. Owns no device storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Drawable {
    pub vertex_array: ResourceId,
    /// `Some` for indexed drawables; the scene buffer's index region.
    pub index_buffer: Option<ResourceId>,
    pub primitive: Primitive,
    /// Indices if indexed, vertices otherwise.
    pub count: u32,
    pub vertex_count: u32,
    /// Byte offset of the first vertex within the buffer.
    pub vertex_offset: u64,
    pub vertex_bytes: u64,
    /// First vertex relative to the vertex array's base offset.
    pub base_vertex: u32,
    pub index_format: Option<IndexFormat>,
    pub index_offset: u64,
    pub index_bytes: u64,
}

impl Drawable {
    pub fn is_indexed(&self) -> bool {
        self.index_format.is_some()
    }

    /// Single-point stand-in sharing this drawable's storage.
    pub fn as_dummy(&self) -> Drawable {
        Drawable {
            primitive: Primitive::Points,
            count: 1,
            ..*self
        }
    }
}

/// The one buffer holding every drawable: vertex region, then index region.
#[derive(Debug)]
pub struct SceneBuffer {
    pub handle: BufferHandle,
    pub vertex_capacity: u64,
    pub index_capacity: u64,
    pub vertex_used: u64,
    pub index_used: u64,
    pub index_format: IndexFormat,
}

impl SceneBuffer {
    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    /// Start of the index region.
    pub fn index_base(&self) -> u64 {
        self.vertex_capacity
    }

    pub fn size(&self) -> u64 {
        self.vertex_capacity + self.index_capacity
    }
}

#[derive(Debug)]
pub struct VertexArray {
    pub handle: VertexArrayHandle,
    pub buffer: ResourceId,
    pub format: VertexFormat,
    pub offset: u64,
}

#[derive(Debug)]
pub struct DemoProgram {
    pub handle: ProgramHandle,
    /// Locations of the fixed uniform set this program declares.
    pub uniforms: BTreeMap<&'static str, UniformLocation>,
    pub blocks: BTreeMap<&'static str, u32>,
}

impl DemoProgram {
    pub fn new(handle: ProgramHandle) -> Self {
        Self {
            handle,
            uniforms: BTreeMap::new(),
            blocks: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }
}

/// Where this run's geometry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometrySource {
    Cache,
    Generated { cached: bool },
}

/// Handles released by [`DemoState::release_all`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub released: usize,
    /// Hooks issued before a library reload that were refused.
    pub stale: usize,
    /// Hooks that ran but found nothing to release.
    pub missing: usize,
}

#[derive(Debug, Default)]
pub struct DemoState {
    pub frame_width: u32,
    pub frame_height: u32,
    pub scene_buffer: Option<SceneBuffer>,
    pub vertex_arrays: BTreeMap<VertexArraySlot, VertexArray>,
    pub drawables: BTreeMap<DrawableSlot, Drawable>,
    /// Aliases the grid drawable; never released on its own.
    pub dummy_drawable: Option<Drawable>,
    pub programs: BTreeMap<ProgramSlot, DemoProgram>,
    pub uniform_buffers: BTreeMap<UniformBufferSlot, BufferHandle>,
    pub textures: BTreeMap<TextureSlot, TextureHandle>,
    pub texture_categories: BTreeMap<TextureCategory, Vec<TextureSlot>>,
    pub framebuffers: BTreeMap<FramebufferSlot, FramebufferHandle>,
    pub geometry_source: Option<GeometrySource>,
    pub report: LoadReport,
}

impl DemoState {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            ..Default::default()
        }
    }

    pub fn drawable(&self, slot: DrawableSlot) -> Option<&Drawable> {
        self.drawables.get(&slot)
    }

    pub fn program(&self, slot: ProgramSlot) -> Option<&DemoProgram> {
        self.programs.get(&slot)
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureHandle> {
        self.textures.get(&slot)
    }

    pub fn framebuffer(&self, slot: FramebufferSlot) -> Option<&FramebufferHandle> {
        self.framebuffers.get(&slot)
    }

    pub fn handle_count(&self) -> usize {
        usize::from(self.scene_buffer.is_some())
            + self.vertex_arrays.len()
            + self.programs.len()
            + self.uniform_buffers.len()
            + self.textures.len()
            + self.framebuffers.len()
    }

    /// Release every handle through its hook and clear the state.
    pub fn release_all(&mut self) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();

        self.dummy_drawable = None;
        self.drawables.clear();
        for (_, vao) in std::mem::take(&mut self.vertex_arrays) {
            tally(&mut summary, vao.handle);
        }
        if let Some(buffer) = self.scene_buffer.take() {
            tally(&mut summary, buffer.handle);
        }
        for (_, program) in std::mem::take(&mut self.programs) {
            tally(&mut summary, program.handle);
        }
        for (_, buffer) in std::mem::take(&mut self.uniform_buffers) {
            tally(&mut summary, buffer);
        }
        for (_, texture) in std::mem::take(&mut self.textures) {
            tally(&mut summary, texture);
        }
        self.texture_categories.clear();
        for (_, framebuffer) in std::mem::take(&mut self.framebuffers) {
            tally(&mut summary, framebuffer);
        }
        self.geometry_source = None;

        log::info!(
            "Released demo state: {} released, {} stale, {} missing",
            summary.released,
            summary.stale,
            summary.missing
        );
        summary
    }
}

fn tally<T: ResourceType>(summary: &mut ReleaseSummary, handle: Handle<T>) {
    let name = handle.name().to_owned();
    match handle.release() {
        Ok(true) => summary.released += 1,
        Ok(false) => {
            log::warn!("'{name}' was already gone");
            summary.missing += 1;
        }
        Err(e) => {
            log::warn!("{e}");
            summary.stale += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::{BufferUsage, HeadlessDevice, RenderDevice};

    #[test]
    fn drawable_layouts_cover_every_vertex_array() {
        for slot in VertexArraySlot::ALL {
            assert!(DrawableSlot::ALL.iter().any(|d| d.vertex_array() == slot));
            assert_eq!(VertexArraySlot::for_format(slot.format()), Some(slot));
        }
    }

    #[test]
    fn dummy_keeps_storage_but_draws_one_point() {
        let d = Drawable {
            vertex_array: ResourceId(2),
            index_buffer: Some(ResourceId(1)),
            primitive: Primitive::Lines,
            count: 84,
            vertex_count: 441,
            vertex_offset: 96,
            vertex_bytes: 441 * 16,
            base_vertex: 0,
            index_format: Some(IndexFormat::U16),
            index_offset: 0,
            index_bytes: 168,
        };
        let dummy = d.as_dummy();
        assert_eq!(dummy.primitive, Primitive::Points);
        assert_eq!(dummy.count, 1);
        assert_eq!(dummy.vertex_offset, d.vertex_offset);
        assert_eq!(dummy.index_buffer, d.index_buffer);
    }

    #[test]
    fn release_all_counts_stale_hooks() {
        let mut dev = HeadlessDevice::new();
        let mut state = DemoState::new(4, 4);
        for slot in UniformBufferSlot::ALL {
            let h = dev.create_buffer(slot.name(), BufferUsage::Uniform, 16).unwrap();
            state.uniform_buffers.insert(slot, h);
        }
        dev.epoch().advance();

        let summary = state.release_all();
        assert_eq!(
            summary,
            ReleaseSummary {
                released: 0,
                stale: 2,
                missing: 0
            }
        );
        assert_eq!(state.handle_count(), 0);
    }
}
