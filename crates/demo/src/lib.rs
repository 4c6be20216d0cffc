//! Demo asset loading: scene geometry, shader programs, textures and render
//! targets, populated into one [`DemoState`] through a [`RenderDevice`].
//!
//! Loaders run in order (geometry first, since program validation needs a
//! vertex array) and collect non-fatal per-item failures in
//! [`DemoState::report`]. After the rendering library is reloaded,
//! [`revalidate`] repairs the state's handles in place.

pub mod config;
pub mod framebuffers;
pub mod geometry;
pub mod report;
pub mod shaders;
pub mod state;
pub mod textures;
pub mod validate;

#[cfg(test)]
mod fixture;

use anyhow::Result;
use renderer::RenderDevice;

pub use config::LoadConfig;
pub use framebuffers::load_framebuffers;
pub use geometry::load_geometry;
pub use report::{LoadIssue, LoadIssueKind, LoadReport};
pub use shaders::load_shaders;
pub use state::{
    DemoProgram, DemoState, Drawable, DrawableSlot, FramebufferSlot, GeometrySource, ProgramSlot,
    ReleaseSummary, SceneBuffer, TextureCategory, TextureSlot, UniformBufferSlot, VertexArray,
    VertexArraySlot,
};
pub use textures::load_textures;
pub use validate::revalidate;

/// Run every loader. On failure whatever was created so far is released.
pub fn load_demo_state(device: &mut dyn RenderDevice, config: &LoadConfig) -> Result<DemoState> {
    let mut state = DemoState::new(config.frame_width, config.frame_height);
    if let Err(e) = populate(device, &mut state, config) {
        state.release_all();
        return Err(e);
    }
    log::info!(
        "Demo state ready on {}: {} handles, {} issues",
        device.backend_name(),
        state.handle_count(),
        state.report.issues().len()
    );
    Ok(state)
}

fn populate(device: &mut dyn RenderDevice, state: &mut DemoState, config: &LoadConfig) -> Result<()> {
    load_geometry(device, state, config)?;
    load_shaders(device, state, config)?;
    load_textures(device, state, config)?;
    load_framebuffers(device, state, config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::ResourceKind;
    use renderer::HeadlessDevice;

    use crate::fixture::{FailOn, FailingDevice, Fixture};

    #[test]
    fn populates_every_slot() {
        let fx = Fixture::new();
        let mut dev = HeadlessDevice::new();
        let state = load_demo_state(&mut dev, &fx.config).unwrap();

        assert!(state.report.is_clean(), "{:?}", state.report);
        assert_eq!(state.drawables.len(), 10);
        assert!(state.dummy_drawable.is_some());
        assert_eq!(state.vertex_arrays.len(), 4);
        assert_eq!(state.programs.len(), 19);
        assert_eq!(state.uniform_buffers.len(), 2);
        assert_eq!(state.textures.len(), 18);
        assert_eq!(state.framebuffers.len(), 12);

        assert_eq!(dev.live_count(ResourceKind::Buffer), 3);
        assert_eq!(dev.live_count(ResourceKind::Shader), 0);
        assert_eq!(state.handle_count(), 1 + 4 + 19 + 2 + 18 + 12);
    }

    #[test]
    fn failed_load_releases_what_it_created() {
        let fx = Fixture::new();
        std::fs::remove_file(fx.resource("obj/teapot/teapot.obj")).unwrap();
        let mut dev = HeadlessDevice::new();

        let err = load_demo_state(&mut dev, &fx.config).unwrap_err();
        assert!(format!("{err:#}").contains("draw:teapot"));
        for kind in ResourceKind::ALL {
            assert_eq!(dev.live_count(kind), 0, "{kind}");
        }
        assert!(!fx.config.cache_path.exists());
    }

    #[test]
    fn failed_generation_leaves_the_cache_file_alone() {
        let fx = Fixture::new();
        let mut dev = HeadlessDevice::new();
        load_demo_state(&mut dev, &fx.config).unwrap().release_all();
        let full = std::fs::read(&fx.config.cache_path).unwrap();
        let truncated = &full[..full.len() / 2];
        std::fs::write(&fx.config.cache_path, truncated).unwrap();

        std::fs::remove_file(fx.resource("obj/teapot/teapot.obj")).unwrap();
        assert!(load_demo_state(&mut dev, &fx.config).is_err());
        assert_eq!(std::fs::read(&fx.config.cache_path).unwrap(), truncated);
        let leftovers = std::fs::read_dir(fx.config.cache_path.parent().unwrap())
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn device_failures_midway_release_everything() {
        let cases = [
            (FailOn::WriteBuffer, 3),
            (FailOn::CreateShader, 5),
            (FailOn::CreateProgram, 5),
            (FailOn::AttachShader, 7),
        ];
        for (fail_on, at) in cases {
            let fx = Fixture::new();
            let mut dev = FailingDevice::new(fail_on, at);
            let err = load_demo_state(&mut dev, &fx.config).unwrap_err();
            assert!(format!("{err:#}").contains("injected"), "{fail_on:?}: {err:#}");
            for kind in ResourceKind::ALL {
                assert_eq!(dev.live_count(kind), 0, "{fail_on:?}: {kind}");
            }
        }
    }
}
