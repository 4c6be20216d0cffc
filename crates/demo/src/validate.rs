//! Handle revalidation after the rendering library has been reloaded.
//!
//! Device objects survive a reload but the release routines captured in
//! their handles do not. Revalidation swaps in fresh hooks and re-derives
//! the CPU-side links between drawables, vertex arrays and the scene buffer.
//! Nothing is created or destroyed, so running it twice is the same as once.

use corelib::{Handle, ResourceType};
use renderer::RenderDevice;

use crate::state::{DemoState, Drawable, DrawableSlot};

/// Refresh every hook and relink drawables. Returns the number of handles
/// refreshed.
pub fn revalidate(state: &mut DemoState, device: &dyn RenderDevice) -> usize {
    if let Some(scene) = state.scene_buffer.as_mut() {
        refresh(&mut scene.handle, device);
    }
    for vao in state.vertex_arrays.values_mut() {
        refresh(&mut vao.handle, device);
    }
    for program in state.programs.values_mut() {
        refresh(&mut program.handle, device);
    }
    for buffer in state.uniform_buffers.values_mut() {
        refresh(buffer, device);
    }
    for texture in state.textures.values_mut() {
        refresh(texture, device);
    }
    for framebuffer in state.framebuffers.values_mut() {
        refresh(framebuffer, device);
    }

    relink(state);
    let refreshed = state.handle_count();
    log::info!(
        "Revalidated {refreshed} handles at library epoch {}",
        device.epoch().current()
    );
    refreshed
}

fn refresh<T: ResourceType>(handle: &mut Handle<T>, device: &dyn RenderDevice) {
    handle.refresh_hook(device.release_hook(T::KIND));
}

fn relink(state: &mut DemoState) {
    let scene = state.scene_buffer.as_ref().map(|s| s.id());
    if let Some(scene) = scene {
        for vao in state.vertex_arrays.values_mut() {
            vao.buffer = scene;
        }
    }

    for (slot, drawable) in state.drawables.iter_mut() {
        match state.vertex_arrays.get(&slot.vertex_array()) {
            Some(vao) => drawable.vertex_array = vao.handle.id(),
            None => log::warn!("{} has no vertex array to relink to", slot.name()),
        }
        if drawable.is_indexed() {
            drawable.index_buffer = scene;
        }
    }

    state.dummy_drawable = state.drawables.get(&DrawableSlot::Grid).map(Drawable::as_dummy);
}
