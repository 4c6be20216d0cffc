//! Shader source groups: a named stage built from one or more GLSL files.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};

/// Subdirectory holding GLSL 4.x sources, relative to the resource root.
pub const GLSL_ROOT: &str = "glsl/4x";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 3] = [Self::Vertex, Self::Geometry, Self::Fragment];

    /// Directory under [`GLSL_ROOT`] the stage's files live in.
    pub fn directory(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::Geometry => "gs",
            ShaderStage::Fragment => "fs",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// One unique shader: its files are concatenated in order into a single
/// compilation unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderSourceDesc {
    pub name: &'static str,
    pub stage: ShaderStage,
    pub files: &'static [&'static str],
}

impl ShaderSourceDesc {
    pub const fn new(
        name: &'static str,
        stage: ShaderStage,
        files: &'static [&'static str],
    ) -> Self {
        Self { name, stage, files }
    }

    /// Absolute paths of every file in the group.
    pub fn paths(&self, resource_dir: &Path) -> Vec<PathBuf> {
        let dir = resource_dir.join(GLSL_ROOT).join(self.stage.directory());
        self.files.iter().map(|f| dir.join(f)).collect()
    }

    /// Read and join the group's files.
    pub fn read(&self, resource_dir: &Path) -> Result<String> {
        ensure!(!self.files.is_empty(), "Shader '{}' lists no source files", self.name);
        let mut source = String::new();
        for path in self.paths(resource_dir) {
            let text = fs::read_to_string(&path).with_context(|| {
                format!("Failed to read source of shader '{}': {}", self.name, path.display())
            })?;
            source.push_str(&text);
            if !text.ends_with('\n') {
                source.push('\n');
            }
        }
        Ok(source)
    }
}
