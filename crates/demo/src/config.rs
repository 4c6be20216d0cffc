//! Loader configuration.

use std::path::{Path, PathBuf};

pub const DEFAULT_RESOURCE_DIR: &str = "resource";
pub const DEFAULT_CACHE_PATH: &str = "data/scene_geometry.dat";
pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 2048;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadConfig {
    /// Root of `glsl/`, `tex/` and `obj/`.
    pub resource_dir: PathBuf,
    pub cache_path: PathBuf,
    /// Read geometry from the cache when present, write it when generated.
    pub streaming: bool,
    pub frame_width: u32,
    pub frame_height: u32,
    pub shadow_map_size: u32,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            resource_dir: PathBuf::from(DEFAULT_RESOURCE_DIR),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            streaming: true,
            frame_width: 1280,
            frame_height: 720,
            shadow_map_size: DEFAULT_SHADOW_MAP_SIZE,
        }
    }
}

impl LoadConfig {
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = dir.into();
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width.max(1);
        self.frame_height = height.max(1);
        self
    }

    /// `relative` resolved against the resource directory.
    pub fn resource(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.resource_dir.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = LoadConfig::default();
        assert!(c.streaming);
        assert_eq!((c.frame_width, c.frame_height), (1280, 720));
        assert_eq!(c.shadow_map_size, 2048);
        assert_eq!(c.resource("tex/a.png"), PathBuf::from("resource/tex/a.png"));
    }

    #[test]
    fn frame_size_is_at_least_one_pixel() {
        let c = LoadConfig::default().with_frame_size(0, 3);
        assert_eq!((c.frame_width, c.frame_height), (1, 3));
    }
}
