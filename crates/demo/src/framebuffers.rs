//! Render targets at full, half, quarter and eighth resolution plus a square
//! shadow map.

use anyhow::{Context, Result};
use renderer::{Attachment, ColorType, DepthType, FramebufferDesc, RenderDevice, TextureParams};

use crate::config::LoadConfig;
use crate::state::{DemoState, FramebufferSlot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferRow {
    pub slot: FramebufferSlot,
    pub name: &'static str,
    pub desc: FramebufferDesc,
}

/// Full size followed by successive halvings, each at least one pixel.
pub fn frame_sizes(width: u32, height: u32) -> [(u32, u32); 4] {
    let mut sizes = [(width.max(1), height.max(1)); 4];
    for i in 1..sizes.len() {
        let (w, h) = sizes[i - 1];
        sizes[i] = ((w / 2).max(1), (h / 2).max(1));
    }
    sizes
}

fn color(count: u32, (width, height): (u32, u32), depth: Option<DepthType>) -> FramebufferDesc {
    FramebufferDesc {
        color_targets: count,
        color_type: ColorType::Rgba16,
        depth,
        width,
        height,
    }
}

pub fn framebuffer_table(config: &LoadConfig) -> Vec<FramebufferRow> {
    use crate::state::FramebufferSlot::*;

    let [full, half, quarter, eighth] = frame_sizes(config.frame_width, config.frame_height);
    let shadow = config.shadow_map_size.max(1);
    let row = |slot, name, desc| FramebufferRow { slot, name, desc };

    vec![
        row(Scene, "fbo:scene:c16x4;d24s8", color(4, full, Some(DepthType::Depth24Stencil8))),
        row(Composite, "fbo:composite:c16", color(1, full, None)),
        row(Shadow, "fbo:shadow:d32", color(0, (shadow, shadow), Some(DepthType::Depth32))),
        row(BrightHalf, "fbo:bright-2:c16", color(1, half, None)),
        row(BlurHorizontalHalf, "fbo:blur-h-2:c16", color(1, half, None)),
        row(BlurVerticalHalf, "fbo:blur-v-2:c16", color(1, half, None)),
        row(BrightQuarter, "fbo:bright-4:c16", color(1, quarter, None)),
        row(BlurHorizontalQuarter, "fbo:blur-h-4:c16", color(1, quarter, None)),
        row(BlurVerticalQuarter, "fbo:blur-v-4:c16", color(1, quarter, None)),
        row(BrightEighth, "fbo:bright-8:c16", color(1, eighth, None)),
        row(BlurHorizontalEighth, "fbo:blur-h-8:c16", color(1, eighth, None)),
        row(BlurVerticalEighth, "fbo:blur-v-8:c16", color(1, eighth, None)),
    ]
}

pub fn load_framebuffers(
    device: &mut dyn RenderDevice,
    state: &mut DemoState,
    config: &LoadConfig,
) -> Result<()> {
    let table = framebuffer_table(config);
    for row in &table {
        let handle = device
            .create_framebuffer(row.name, &row.desc)
            .with_context(|| format!("Failed to create framebuffer '{}'", row.name))?;
        state.framebuffers.insert(row.slot, handle);
    }

    // every attachment is sampled clamped and filtered
    for row in &table {
        let Some(fbo) = state.framebuffers.get(&row.slot) else {
            continue;
        };
        for i in 0..row.desc.color_targets {
            device.set_attachment_params(fbo.id(), Attachment::Color(i), TextureParams::LINEAR_CLAMP)?;
        }
        if row.desc.depth.is_some() {
            device.set_attachment_params(fbo.id(), Attachment::Depth, TextureParams::LINEAR_CLAMP)?;
        }
    }

    log::info!(
        "Created {} framebuffers ({}x{} frame, {} shadow map)",
        state.framebuffers.len(),
        config.frame_width,
        config.frame_height,
        config.shadow_map_size
    );
    Ok(())
}
