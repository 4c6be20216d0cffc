//! Shader programs: compile every unique shader once, build programs from
//! them, then cache uniform locations and set defaults.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use asset::ShaderSourceDesc;
use asset::ShaderStage::{Fragment, Geometry, Vertex};
use corelib::{Handle, Mat4, ResourceId, ResourceType, ShaderHandle, Vec3, Vec4};
use renderer::{BufferUsage, RenderDevice, UniformValue};

use crate::config::LoadConfig;
use crate::report::{LoadIssueKind, LoadReport};
use crate::state::{DemoProgram, DemoState, ProgramSlot, UniformBufferSlot};

/// Every unique shader, compiled once in this order.
pub const SHADERS: [ShaderSourceDesc; 20] = [
    // vertex
    ShaderSourceDesc::new("shdr-vs:passthru-trans", Vertex, &["passthru_transform_vs4x.glsl"]),
    ShaderSourceDesc::new("shdr-vs:pass-col-trans", Vertex, &["passColor_transform_vs4x.glsl"]),
    ShaderSourceDesc::new(
        "shdr-vs:passthru-trans-inst",
        Vertex,
        &["passthru_transform_instanced_vs4x.glsl"],
    ),
    ShaderSourceDesc::new(
        "shdr-vs:pass-col-trans-inst",
        Vertex,
        &["passColor_transform_instanced_vs4x.glsl"],
    ),
    ShaderSourceDesc::new(
        "shdr-vs:pass-tex-trans",
        Vertex,
        &["00-common/passTexcoord_transform_vs4x.glsl"],
    ),
    ShaderSourceDesc::new(
        "shdr-vs:pass-tb-trans",
        Vertex,
        &["00-common/passTangentBasis_transform_vs4x.glsl"],
    ),
    ShaderSourceDesc::new(
        "shdr-vs:pass-tex-trans-inst",
        Vertex,
        &["00-common/passTexcoord_transform_instanced_vs4x.glsl"],
    ),
    ShaderSourceDesc::new(
        "shdr-vs:pass-tb-trans-inst",
        Vertex,
        &["00-common/passTangentBasis_transform_instanced_vs4x.glsl"],
    ),
    ShaderSourceDesc::new(
        "shdr-vs:pass-tb-sc-trans",
        Vertex,
        &["01-pipeline/passTangentBasis_shadowCoord_transform_vs4x.glsl"],
    ),
    ShaderSourceDesc::new(
        "shdr-vs:pass-tb-sc-trans-inst",
        Vertex,
        &["01-pipeline/passTangentBasis_shadowCoord_transform_instanced_vs4x.glsl"],
    ),
    // geometry
    ShaderSourceDesc::new(
        "shdr-gs:draw-tb",
        Geometry,
        &["00-common/drawTangentBasis_gs4x.glsl", "00-common/utilCommon_gs4x.glsl"],
    ),
    // fragment
    ShaderSourceDesc::new("shdr-fs:draw-col-unif", Fragment, &["drawColorUnif_fs4x.glsl"]),
    ShaderSourceDesc::new("shdr-fs:draw-col-attr", Fragment, &["drawColorAttrib_fs4x.glsl"]),
    ShaderSourceDesc::new("shdr-fs:draw-tex", Fragment, &["00-common/drawTexture_fs4x.glsl"]),
    ShaderSourceDesc::new(
        "shdr-fs:draw-Lambert",
        Fragment,
        &["00-common/drawLambert_fs4x.glsl", "00-common/utilCommon_fs4x.glsl"],
    ),
    ShaderSourceDesc::new(
        "shdr-fs:draw-Phong",
        Fragment,
        &["00-common/drawPhong_fs4x.glsl", "00-common/utilCommon_fs4x.glsl"],
    ),
    ShaderSourceDesc::new("shdr-fs:post-bright", Fragment, &["01-pipeline/postBright_fs4x.glsl"]),
    ShaderSourceDesc::new("shdr-fs:post-blur", Fragment, &["01-pipeline/postBlur_fs4x.glsl"]),
    ShaderSourceDesc::new("shdr-fs:post-blend", Fragment, &["01-pipeline/postBlend_fs4x.glsl"]),
    ShaderSourceDesc::new(
        "shdr-fs:draw-Phong-shadow",
        Fragment,
        &["01-pipeline/drawPhong_shadow_fs4x.glsl", "00-common/utilCommon_fs4x.glsl"],
    ),
];

/// A program and the shaders it is built from, by name.
#[derive(Clone, Copy, Debug)]
pub struct ProgramRow {
    pub slot: ProgramSlot,
    pub shaders: &'static [&'static str],
}

const fn program(slot: ProgramSlot, shaders: &'static [&'static str]) -> ProgramRow {
    ProgramRow { slot, shaders }
}

pub const PROGRAMS: [ProgramRow; 19] = [
    program(ProgramSlot::Transform, &["shdr-vs:passthru-trans"]),
    program(ProgramSlot::TransformInstanced, &["shdr-vs:passthru-trans-inst"]),
    program(ProgramSlot::DrawColorUnif, &["shdr-vs:passthru-trans", "shdr-fs:draw-col-unif"]),
    program(ProgramSlot::DrawColorAttrib, &["shdr-vs:pass-col-trans", "shdr-fs:draw-col-attr"]),
    program(
        ProgramSlot::DrawColorUnifInstanced,
        &["shdr-vs:passthru-trans-inst", "shdr-fs:draw-col-unif"],
    ),
    program(
        ProgramSlot::DrawColorAttribInstanced,
        &["shdr-vs:pass-col-trans-inst", "shdr-fs:draw-col-attr"],
    ),
    program(ProgramSlot::DrawTexture, &["shdr-vs:pass-tex-trans", "shdr-fs:draw-tex"]),
    program(ProgramSlot::DrawTextureInstanced, &["shdr-vs:pass-tex-trans-inst", "shdr-fs:draw-tex"]),
    program(ProgramSlot::DrawLambert, &["shdr-vs:pass-tb-trans", "shdr-fs:draw-Lambert"]),
    program(
        ProgramSlot::DrawLambertInstanced,
        &["shdr-vs:pass-tb-trans-inst", "shdr-fs:draw-Lambert"],
    ),
    program(ProgramSlot::DrawPhong, &["shdr-vs:pass-tb-trans", "shdr-fs:draw-Phong"]),
    program(ProgramSlot::DrawPhongInstanced, &["shdr-vs:pass-tb-trans-inst", "shdr-fs:draw-Phong"]),
    program(
        ProgramSlot::DrawTangentBasis,
        &["shdr-vs:pass-tb-trans", "shdr-gs:draw-tb", "shdr-fs:draw-col-attr"],
    ),
    program(
        ProgramSlot::DrawTangentBasisInstanced,
        &["shdr-vs:pass-tb-trans-inst", "shdr-gs:draw-tb", "shdr-fs:draw-col-attr"],
    ),
    program(
        ProgramSlot::DrawPhongShadow,
        &["shdr-vs:pass-tb-sc-trans", "shdr-fs:draw-Phong-shadow"],
    ),
    program(
        ProgramSlot::DrawPhongShadowInstanced,
        &["shdr-vs:pass-tb-sc-trans-inst", "shdr-fs:draw-Phong-shadow"],
    ),
    program(ProgramSlot::PostBright, &["shdr-vs:pass-tex-trans", "shdr-fs:post-bright"]),
    program(ProgramSlot::PostBlur, &["shdr-vs:pass-tex-trans", "shdr-fs:post-blur"]),
    program(ProgramSlot::PostBlend, &["shdr-vs:pass-tex-trans", "shdr-fs:post-blend"]),
];

/// The fixed uniform set and the value each starts with. Programs that do not
/// declare a uniform simply skip it.
pub const UNIFORM_DEFAULTS: [(&str, UniformValue); 34] = [
    // transforms
    ("uMVP", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uMV", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uP", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uP_inv", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uPB", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uPB_inv", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uMV_nrm", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uMVPB", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uMVPB_other", UniformValue::Mat4(Mat4::IDENTITY)),
    ("uAtlas", UniformValue::Mat4(Mat4::IDENTITY)),
    // texture units
    ("uTex_dm", UniformValue::Int(0)),
    ("uTex_sm", UniformValue::Int(1)),
    ("uTex_nm", UniformValue::Int(2)),
    ("uTex_hm", UniformValue::Int(3)),
    ("uTex_ramp_dm", UniformValue::Int(4)),
    ("uTex_ramp_sm", UniformValue::Int(5)),
    ("uTex_shadow", UniformValue::Int(6)),
    ("uTex_project", UniformValue::Int(7)),
    ("uImage00", UniformValue::Int(0)),
    ("uImage01", UniformValue::Int(1)),
    ("uImage02", UniformValue::Int(2)),
    ("uImage03", UniformValue::Int(3)),
    ("uImage04", UniformValue::Int(4)),
    ("uImage05", UniformValue::Int(5)),
    ("uImage06", UniformValue::Int(6)),
    ("uImage07", UniformValue::Int(7)),
    // scalars
    ("uIndex", UniformValue::Int(0)),
    ("uCount", UniformValue::Int(0)),
    ("uAxis", UniformValue::Double(0.0)),
    ("uSize", UniformValue::Double(0.0)),
    ("uFlag", UniformValue::Double(0.0)),
    ("uTime", UniformValue::Double(0.0)),
    // colors
    ("uColor0", UniformValue::Vec4(Vec4::ONE)),
    ("uColor", UniformValue::Vec4(Vec4::ONE)),
];

/// Uniform blocks and the binding point each is attached to.
pub const UNIFORM_BLOCKS: [(&str, u32); 6] = [
    ("ubTransformStack", 0),
    ("ubTransformBlend", 1),
    ("ubTransformMVP", 0),
    ("ubTransformMVPB", 1),
    ("ubMaterial", 2),
    ("ubLight", 3),
];

/// Scales the unit quad to cover clip space.
pub fn fullscreen_quad_mvp() -> Mat4 {
    Mat4::from_scale(Vec3::splat(2.0))
}

pub fn load_shaders(
    device: &mut dyn RenderDevice,
    state: &mut DemoState,
    config: &LoadConfig,
) -> Result<()> {
    let shaders = compile_shaders(device, config, &mut state.report)?;
    let built = build_programs(device, state, &shaders);
    // programs keep what they need from their shaders
    let released = release_shaders(shaders);
    built?;
    log::debug!("Released {} shader objects", released?);

    for row in &PROGRAMS {
        if let Some(program) = state.programs.get_mut(&row.slot) {
            set_defaults(device, row.slot, program)?;
        }
    }
    device.activate_program(None)?;

    let size = device.limits().max_uniform_block_size;
    for slot in UniformBufferSlot::ALL {
        let buffer = device
            .create_buffer(slot.name(), BufferUsage::Uniform, size)
            .with_context(|| format!("Failed to create {}", slot.name()))?;
        state.uniform_buffers.insert(slot, buffer);
    }

    log::info!(
        "Loaded {} programs from {} shaders ({} compile, {} link, {} validate failures)",
        state.programs.len(),
        SHADERS.len(),
        state.report.count(LoadIssueKind::ShaderCompile),
        state.report.count(LoadIssueKind::ProgramLink),
        state.report.count(LoadIssueKind::ProgramValidate)
    );
    Ok(())
}

/// Create and compile every shader. Failures are reported, and the shader
/// object is kept so programs using it fail to link.
fn compile_shaders(
    device: &mut dyn RenderDevice,
    config: &LoadConfig,
    report: &mut LoadReport,
) -> Result<BTreeMap<&'static str, ShaderHandle>> {
    let mut shaders = BTreeMap::new();
    for (index, desc) in SHADERS.iter().enumerate() {
        if shaders.contains_key(desc.name) {
            discard(shaders.into_values());
            bail!("Shader '{}' is listed twice", desc.name);
        }
        let handle = match device.create_shader(desc.name, desc.stage) {
            Ok(handle) => handle,
            Err(e) => {
                discard(shaders.into_values());
                return Err(e).with_context(|| format!("Failed to create shader '{}'", desc.name));
            }
        };
        let compiled = desc
            .read(&config.resource_dir)
            .and_then(|source| Ok(device.compile_shader(handle.id(), &source)?));
        if let Err(e) = compiled {
            log::error!("Shader {index} '{}' failed to compile: {e:#}", desc.name);
            report.push(LoadIssueKind::ShaderCompile, index, desc.name, format!("{e:#}"));
        }
        shaders.insert(desc.name, handle);
    }
    Ok(shaders)
}

/// Create every program, attach its shaders, then link and validate with the
/// richest vertex array active.
fn build_programs(
    device: &mut dyn RenderDevice,
    state: &mut DemoState,
    shaders: &BTreeMap<&'static str, ShaderHandle>,
) -> Result<()> {
    for row in &PROGRAMS {
        let handle = device
            .create_program(row.slot.name())
            .with_context(|| format!("Failed to create program {}", row.slot.name()))?;
        if let Err(e) = attach_shaders(device, handle.id(), row, shaders) {
            discard([handle]);
            return Err(e);
        }
        state.programs.insert(row.slot, DemoProgram::new(handle));
    }

    // validation checks attribute bindings against the active vertex array
    let richest = state
        .vertex_arrays
        .values()
        .max_by_key(|vao| vao.format.attribute_count())
        .map(|vao| vao.handle.id());
    if richest.is_none() {
        log::warn!("No vertex array loaded; program validation will fail");
    }
    device.activate_vertex_array(richest)?;
    link_and_validate(device, state);
    device.activate_vertex_array(None)?;
    Ok(())
}

fn attach_shaders(
    device: &mut dyn RenderDevice,
    program: ResourceId,
    row: &ProgramRow,
    shaders: &BTreeMap<&'static str, ShaderHandle>,
) -> Result<()> {
    for name in row.shaders {
        let shader = shaders
            .get(name)
            .ok_or_else(|| anyhow!("Program {} uses unknown shader '{name}'", row.slot.name()))?;
        device
            .attach_shader(program, shader.id())
            .with_context(|| format!("Failed to attach '{name}' to {}", row.slot.name()))?;
    }
    Ok(())
}

/// Release every shader, returning how many there were. All are released
/// even when one fails; the first failure is returned.
fn release_shaders(shaders: BTreeMap<&'static str, ShaderHandle>) -> Result<usize> {
    let count = shaders.len();
    let mut first_error = None;
    for (name, shader) in shaders {
        if let Err(e) = shader.release() {
            first_error.get_or_insert(
                anyhow::Error::new(e).context(format!("Failed to release shader '{name}'")),
            );
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(count),
    }
}

/// Release handles on an error path, where only logging is left to do.
fn discard<T: ResourceType>(handles: impl IntoIterator<Item = Handle<T>>) {
    for handle in handles {
        let name = handle.name().to_owned();
        if let Err(e) = handle.release() {
            log::warn!("Failed to release '{name}' after a failed load: {e}");
        }
    }
}

fn link_and_validate(device: &mut dyn RenderDevice, state: &mut DemoState) {
    for (index, row) in PROGRAMS.iter().enumerate() {
        let Some(program) = state.programs.get(&row.slot) else {
            continue;
        };
        let name = row.slot.name();
        if let Err(e) = device.link_program(program.id()) {
            log::error!("Program {index} '{name}' failed to link: {e}");
            state.report.push(LoadIssueKind::ProgramLink, index, name, e.to_string());
            continue;
        }
        if let Err(e) = device.validate_program(program.id()) {
            log::error!("Program {index} '{name}' failed to validate: {e}");
            state.report.push(LoadIssueKind::ProgramValidate, index, name, e.to_string());
        }
    }
}

fn set_defaults(device: &mut dyn RenderDevice, slot: ProgramSlot, program: &mut DemoProgram) -> Result<()> {
    let id = program.id();
    device.activate_program(Some(id))?;

    for (name, value) in UNIFORM_DEFAULTS {
        let Some(location) = device.uniform_location(id, name) else {
            continue;
        };
        program.uniforms.insert(name, location);
        if let Err(e) = device.set_uniform(id, location, value) {
            log::warn!("{}: cannot set default for {name}: {e}", slot.name());
        }
    }
    for (name, binding) in UNIFORM_BLOCKS {
        let Some(block) = device.uniform_block_index(id, name) else {
            continue;
        };
        program.blocks.insert(name, block);
        device.bind_uniform_block(id, block, binding)?;
    }

    if slot.is_post_process() {
        if let Some(&location) = program.uniforms.get("uMVP") {
            let mvp = UniformValue::Mat4(fullscreen_quad_mvp());
            if let Err(e) = device.set_uniform(id, location, mvp) {
                log::warn!("{}: cannot set the full-screen uMVP: {e}", slot.name());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;

    use super::*;
    use asset::ShaderStage;
    use corelib::ResourceKind;
    use renderer::{HeadlessDevice, ProgramStatus};

    use crate::fixture::Fixture;
    use crate::geometry::load_geometry;

    fn load(fx: &Fixture, with_geometry: bool) -> (HeadlessDevice, DemoState) {
        let mut dev = HeadlessDevice::new();
        let mut state = DemoState::new(64, 48);
        if with_geometry {
            load_geometry(&mut dev, &mut state, &fx.config).unwrap();
        }
        load_shaders(&mut dev, &mut state, &fx.config).unwrap();
        (dev, state)
    }

    fn status(dev: &HeadlessDevice, state: &DemoState, slot: ProgramSlot) -> ProgramStatus {
        dev.program_status(state.programs[&slot].id()).unwrap()
    }

    #[test]
    fn tables_are_consistent() {
        let mut names = BTreeSet::new();
        for desc in &SHADERS {
            assert!(names.insert(desc.name), "{} listed twice", desc.name);
            assert!(PROGRAMS.iter().any(|p| p.shaders.contains(&desc.name)), "{} unused", desc.name);
        }
        for row in &PROGRAMS {
            let vertex = row
                .shaders
                .iter()
                .filter(|name| SHADERS.iter().any(|d| d.name == **name && d.stage == ShaderStage::Vertex))
                .count();
            assert_eq!(vertex, 1, "{}", row.slot.name());
            assert!(row.shaders.iter().all(|name| names.contains(name)));
        }
    }

    #[test]
    fn every_program_links_and_validates() {
        let fx = Fixture::new();
        let (dev, state) = load(&fx, true);

        assert!(state.report.is_clean(), "{:?}", state.report);
        assert_eq!(state.programs.len(), 19);
        for row in &PROGRAMS {
            assert_eq!(
                status(&dev, &state, row.slot),
                ProgramStatus {
                    linked: true,
                    validated: true
                },
                "{}",
                row.slot.name()
            );
        }
        assert_eq!(dev.live_count(ResourceKind::Shader), 0);
        assert_eq!(dev.active_vertex_array(), None);
        assert_eq!(dev.active_program(), None);
    }

    #[test]
    fn defaults_are_set_and_locations_cached() {
        let fx = Fixture::new();
        let (dev, state) = load(&fx, true);

        let phong = &state.programs[&ProgramSlot::DrawPhong];
        assert!(phong.uniforms.contains_key("uMVP"));
        assert!(phong.uniforms.contains_key("uTex_sm"));
        assert!(!phong.uniforms.contains_key("uAtlas"));
        assert_eq!(phong.blocks.len(), 2);

        let id = phong.id();
        assert_eq!(dev.uniform_value(id, "uMVP"), Some(UniformValue::Mat4(Mat4::IDENTITY)));
        assert_eq!(dev.uniform_value(id, "uTex_dm"), Some(UniformValue::Int(0)));
        assert_eq!(dev.uniform_value(id, "uTex_sm"), Some(UniformValue::Int(1)));
        assert_eq!(dev.uniform_value(id, "uTime"), Some(UniformValue::Double(0.0)));
        assert_eq!(dev.uniform_value(id, "uColor"), Some(UniformValue::Vec4(Vec4::ONE)));
        assert_eq!(dev.uniform_block_binding(id, "ubTransformStack"), Some(0));
        assert_eq!(dev.uniform_block_binding(id, "ubLight"), Some(3));

        let tb = state.programs[&ProgramSlot::DrawTangentBasis].id();
        assert_eq!(dev.uniform_value(tb, "uP"), Some(UniformValue::Mat4(Mat4::IDENTITY)));
    }

    #[test]
    fn post_processing_programs_cover_the_screen() {
        let fx = Fixture::new();
        let (dev, state) = load(&fx, true);
        for row in &PROGRAMS {
            let expected = if row.slot.is_post_process() {
                fullscreen_quad_mvp()
            } else {
                Mat4::IDENTITY
            };
            let id = state.programs[&row.slot].id();
            assert_eq!(
                dev.uniform_value(id, "uMVP"),
                Some(UniformValue::Mat4(expected)),
                "{}",
                row.slot.name()
            );
        }
        assert_eq!(fullscreen_quad_mvp().transform_point3(Vec3::splat(0.5)), Vec3::ONE);
    }

    #[test]
    fn mistyped_mvp_only_warns() {
        let fx = Fixture::new();
        let source = crate::fixture::VERTEX_SOURCE
            .replace("uniform mat4 uMVP, uMV_nrm;", "uniform vec4 uMVP;\nuniform mat4 uMV_nrm;");
        for desc in SHADERS.iter().filter(|d| d.stage == ShaderStage::Vertex) {
            fs::write(&desc.paths(&fx.config.resource_dir)[0], &source).unwrap();
        }

        let (dev, state) = load(&fx, true);
        assert_eq!(state.programs.len(), 19);
        assert_eq!(state.report.count(LoadIssueKind::ProgramLink), 0);
        for row in PROGRAMS.iter().filter(|row| row.slot.is_post_process()) {
            let program = &state.programs[&row.slot];
            assert!(program.uniforms.contains_key("uMVP"), "{}", row.slot.name());
            assert_eq!(dev.uniform_value(program.id(), "uMVP"), None);
        }
        assert_eq!(state.uniform_buffers.len(), 2);
    }

    #[test]
    fn uniform_buffers_use_the_block_size_limit() {
        let fx = Fixture::new();
        let (dev, state) = load(&fx, true);
        let limit = dev.limits().max_uniform_block_size as usize;
        for slot in UniformBufferSlot::ALL {
            let id = state.uniform_buffers[&slot].id();
            assert_eq!(dev.buffer_usage(id), Some(BufferUsage::Uniform));
            assert_eq!(dev.buffer_data(id).map(|d| d.len()), Some(limit));
        }
    }

    #[test]
    fn compile_failures_are_reported_and_block_linking() {
        let fx = Fixture::new();
        fs::write(
            fx.shader_file(ShaderStage::Fragment, "drawColorUnif_fs4x.glsl"),
            "void main() {}\n",
        )
        .unwrap();
        fs::remove_file(fx.shader_file(ShaderStage::Fragment, "01-pipeline/postBlur_fs4x.glsl")).unwrap();

        let (dev, state) = load(&fx, true);
        let compile: Vec<_> = state
            .report
            .of_kind(LoadIssueKind::ShaderCompile)
            .map(|i| (i.index, i.name.as_str()))
            .collect();
        assert_eq!(compile, [(11, "shdr-fs:draw-col-unif"), (17, "shdr-fs:post-blur")]);

        let link: Vec<_> = state
            .report
            .of_kind(LoadIssueKind::ProgramLink)
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(
            link,
            ["prog:draw-col-unif", "prog:draw-col-unif-inst", "prog:post-blur"]
        );
        assert_eq!(state.report.count(LoadIssueKind::ProgramValidate), 0);

        let broken = &state.programs[&ProgramSlot::DrawColorUnif];
        assert!(broken.uniforms.is_empty());
        assert!(!status(&dev, &state, ProgramSlot::DrawColorUnif).linked);
        assert!(status(&dev, &state, ProgramSlot::DrawColorAttrib).validated);
        assert_eq!(dev.live_count(ResourceKind::Shader), 0);
    }

    #[test]
    fn validation_needs_loaded_geometry() {
        let fx = Fixture::new();
        let (_dev, state) = load(&fx, false);
        assert_eq!(state.report.count(LoadIssueKind::ProgramLink), 0);
        assert_eq!(state.report.count(LoadIssueKind::ProgramValidate), PROGRAMS.len());
    }
}
