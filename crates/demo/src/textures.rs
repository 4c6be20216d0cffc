//! Textures: decode and upload each file, then apply sampling settings per
//! category.

use anyhow::{Context, Result};
use asset::TextureData;
use renderer::{FilterMode, RenderDevice, TextureParams, WrapMode};

use crate::config::LoadConfig;
use crate::report::LoadIssueKind;
use crate::state::TextureCategory::{Material, Ramp, Skybox, Sprite};
use crate::state::{DemoState, TextureCategory, TextureSlot};

/// Side of the checkerboard substituted for textures that fail to decode.
pub const FALLBACK_SIZE: u32 = 64;

#[derive(Clone, Copy, Debug)]
pub struct TextureRow {
    pub slot: TextureSlot,
    pub name: &'static str,
    /// Relative to the resource directory.
    pub path: &'static str,
    pub category: TextureCategory,
}

const fn texture(
    slot: TextureSlot,
    name: &'static str,
    path: &'static str,
    category: TextureCategory,
) -> TextureRow {
    TextureRow {
        slot,
        name,
        path,
        category,
    }
}

pub const TEXTURES: [TextureRow; 18] = [
    texture(TextureSlot::EarthDiffuse, "tex:earth-dm", "tex/earth/2k/earth_dm_2k.png", Material),
    texture(TextureSlot::EarthSpecular, "tex:earth-sm", "tex/earth/2k/earth_sm_2k.png", Material),
    texture(TextureSlot::EarthNormal, "tex:earth-nm", "tex/earth/2k/earth_nm_2k.png", Material),
    texture(TextureSlot::EarthHeight, "tex:earth-hm", "tex/earth/2k/earth_hm_2k.png", Material),
    texture(TextureSlot::MarsDiffuse, "tex:mars-dm", "tex/mars/1k/mars_1k_dm.png", Material),
    texture(TextureSlot::MarsSpecular, "tex:mars-sm", "tex/mars/1k/mars_1k_sm.png", Material),
    texture(TextureSlot::MarsNormal, "tex:mars-nm", "tex/mars/1k/mars_1k_nm.png", Material),
    texture(TextureSlot::MarsHeight, "tex:mars-hm", "tex/mars/1k/mars_1k_hm.png", Material),
    texture(TextureSlot::StoneDiffuse, "tex:stone-dm", "tex/stone/stone_dm.png", Material),
    texture(TextureSlot::StoneNormal, "tex:stone-nm", "tex/stone/stone_nm.png", Material),
    texture(TextureSlot::StoneHeight, "tex:stone-hm", "tex/stone/stone_hm.png", Material),
    texture(TextureSlot::SunDiffuse, "tex:sun-dm", "tex/sun/1k/sun_dm.png", Material),
    texture(TextureSlot::SkyClouds, "tex:sky-clouds", "tex/bg/sky_clouds.png", Skybox),
    texture(TextureSlot::SkyWater, "tex:sky-water", "tex/bg/sky_water.png", Skybox),
    texture(TextureSlot::RampDiffuse, "tex:ramp-dm", "tex/sprite/celRamp_dm.png", Ramp),
    texture(TextureSlot::RampSpecular, "tex:ramp-sm", "tex/sprite/celRamp_sm.png", Ramp),
    texture(TextureSlot::TestSprite, "tex:testsprite", "tex/sprite/spriteTest8x8.png", Sprite),
    texture(TextureSlot::Checker, "tex:checker", "tex/sprite/checker.png", Sprite),
];

/// Sampling applied to a category after upload; `None` keeps device defaults.
pub fn category_params(category: TextureCategory) -> Option<TextureParams> {
    match category {
        Material | Skybox => Some(TextureParams::new(
            FilterMode::Linear,
            WrapMode::Repeat,
            WrapMode::Clamp,
        )),
        Ramp => Some(TextureParams::LINEAR_CLAMP),
        Sprite => None,
    }
}

pub fn load_textures(
    device: &mut dyn RenderDevice,
    state: &mut DemoState,
    config: &LoadConfig,
) -> Result<()> {
    for (index, row) in TEXTURES.iter().enumerate() {
        let path = config.resource(row.path);
        let data = match TextureData::load(&path) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Texture {index} '{}' unavailable, using a checkerboard: {e:#}", row.name);
                state
                    .report
                    .push(LoadIssueKind::TextureFallback, index, row.name, format!("{e:#}"));
                TextureData::checker(FALLBACK_SIZE)
            }
        };
        let handle = device
            .create_texture(row.name, &data)
            .with_context(|| format!("Failed to upload texture '{}'", row.name))?;
        state.textures.insert(row.slot, handle);
        state.texture_categories.entry(row.category).or_default().push(row.slot);
    }

    for (category, slots) in &state.texture_categories {
        let Some(params) = category_params(*category) else {
            continue;
        };
        for slot in slots {
            if let Some(texture) = state.textures.get(slot) {
                device.set_texture_params(texture.id(), params)?;
            }
        }
    }

    log::info!(
        "Loaded {} textures ({} fallbacks)",
        state.textures.len(),
        state.report.count(LoadIssueKind::TextureFallback)
    );
    Ok(())
}
