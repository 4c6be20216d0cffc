//! Program link/validate bookkeeping shared by every backend.
//!
//! A program records what it needs from each attached shader at attach time
//! (stage, compile status, reflected declarations), so shaders may be
//! released as soon as programs are built.
//!
//! Link succeeds when there is exactly one vertex shader, no stage appears
//! twice, every attached shader compiled and uniforms declared in more than
//! one stage agree on their type. Validation additionally needs an active
//! vertex array and every located vertex input to name a known attribute.

use std::collections::{BTreeMap, BTreeSet};

use asset::{ShaderStage, VertexAttribute};
use corelib::ResourceId;

use crate::device::{RenderError, RenderResult, UniformLocation, UniformValue};
use crate::reflect::{GlslType, InputDecl, ShaderReflection};

#[derive(Clone, Debug)]
pub struct AttachedShader {
    pub shader: ResourceId,
    pub name: String,
    pub stage: ShaderStage,
    pub compiled: bool,
    pub reflection: ShaderReflection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformSlot {
    pub name: String,
    pub ty: GlslType,
    pub value: Option<UniformValue>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSlot {
    pub name: String,
    pub binding: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramStatus {
    pub linked: bool,
    pub validated: bool,
}

#[derive(Clone, Debug)]
pub struct ProgramRecord {
    pub name: String,
    attached: Vec<AttachedShader>,
    status: ProgramStatus,
    /// Indexed by location.
    uniforms: Vec<UniformSlot>,
    /// Indexed by block index.
    blocks: Vec<BlockSlot>,
    inputs: Vec<InputDecl>,
}

impl ProgramRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attached: Vec::new(),
            status: ProgramStatus::default(),
            uniforms: Vec::new(),
            blocks: Vec::new(),
            inputs: Vec::new(),
        }
    }

    pub fn status(&self) -> ProgramStatus {
        self.status
    }

    pub fn attached(&self) -> &[AttachedShader] {
        &self.attached
    }

    pub fn attach(&mut self, shader: AttachedShader) -> RenderResult<()> {
        if self.attached.iter().any(|s| s.shader == shader.shader) {
            return Err(RenderError::Device(format!(
                "shader '{}' is already attached to program '{}'",
                shader.name, self.name
            )));
        }
        self.attached.push(shader);
        Ok(())
    }

    pub fn link(&mut self) -> RenderResult<()> {
        self.status = ProgramStatus::default();
        self.uniforms.clear();
        self.blocks.clear();
        self.inputs.clear();

        self.check_stages().map_err(|reason| self.link_error(reason))?;

        let mut uniforms: BTreeMap<&str, &GlslType> = BTreeMap::new();
        let mut blocks: BTreeSet<&str> = BTreeSet::new();
        for shader in &self.attached {
            for u in &shader.reflection.uniforms {
                if let Some(existing) = uniforms.insert(&u.name, &u.ty) {
                    if *existing != u.ty {
                        let reason = format!(
                            "uniform '{}' declared as both {existing} and {}",
                            u.name, u.ty
                        );
                        return Err(self.link_error(reason));
                    }
                }
            }
            for b in &shader.reflection.blocks {
                blocks.insert(b);
            }
        }

        let uniforms: Vec<UniformSlot> = uniforms
            .into_iter()
            .map(|(name, ty)| UniformSlot {
                name: name.to_owned(),
                ty: ty.clone(),
                value: None,
            })
            .collect();
        let blocks: Vec<BlockSlot> = blocks
            .into_iter()
            .map(|name| BlockSlot {
                name: name.to_owned(),
                binding: None,
            })
            .collect();
        let inputs = self
            .attached
            .iter()
            .find(|s| s.stage == ShaderStage::Vertex)
            .map(|s| s.reflection.inputs.clone())
            .unwrap_or_default();

        self.uniforms = uniforms;
        self.blocks = blocks;
        self.inputs = inputs;
        self.status.linked = true;
        Ok(())
    }

    fn check_stages(&self) -> Result<(), String> {
        if let Some(s) = self.attached.iter().find(|s| !s.compiled) {
            return Err(format!("attached shader '{}' is not compiled", s.name));
        }
        for stage in ShaderStage::ALL {
            let count = self.attached.iter().filter(|s| s.stage == stage).count();
            match stage {
                ShaderStage::Vertex if count != 1 => {
                    return Err(format!("needs exactly one vertex shader, found {count}"));
                }
                _ if count > 1 => return Err(format!("{count} {stage} shaders attached")),
                _ => {}
            }
        }
        Ok(())
    }

    fn link_error(&self, reason: String) -> RenderError {
        RenderError::LinkFailed {
            name: self.name.clone(),
            reason,
        }
    }

    pub fn validate(&mut self, vertex_array_active: bool) -> RenderResult<()> {
        self.status.validated = false;
        let fail = |reason: String| RenderError::ValidateFailed {
            name: self.name.clone(),
            reason,
        };
        if !self.status.linked {
            return Err(fail("program is not linked".into()));
        }
        if !vertex_array_active {
            return Err(fail("no vertex array is active".into()));
        }
        for input in &self.inputs {
            if let Some(location) = input.location {
                if VertexAttribute::from_location(location).is_none() {
                    return Err(fail(format!(
                        "input '{}' uses location {location}, which no vertex attribute provides",
                        input.name
                    )));
                }
            }
        }
        self.status.validated = true;
        Ok(())
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        if !self.status.linked {
            return None;
        }
        self.uniforms
            .iter()
            .position(|u| u.name == name)
            .map(|i| UniformLocation(i as i32))
    }

    pub fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> RenderResult<()> {
        let program = self.name.clone();
        let slot = usize::try_from(location.0)
            .ok()
            .and_then(|i| self.uniforms.get_mut(i))
            .ok_or_else(|| RenderError::Device(format!(
                "program '{program}' has no uniform at location {}",
                location.0
            )))?;
        if !slot.ty.accepts(&value) {
            return Err(RenderError::UniformType {
                program,
                location: location.0,
                expected: slot.ty.to_string(),
            });
        }
        slot.value = Some(value);
        Ok(())
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn uniform_block_index(&self, name: &str) -> Option<u32> {
        if !self.status.linked {
            return None;
        }
        self.blocks.iter().position(|b| b.name == name).map(|i| i as u32)
    }

    pub fn bind_uniform_block(&mut self, block: u32, binding: u32) -> RenderResult<()> {
        let program = self.name.clone();
        let slot = self.blocks.get_mut(block as usize).ok_or_else(|| {
            RenderError::Device(format!("program '{program}' has no uniform block {block}"))
        })?;
        slot.binding = Some(binding);
        Ok(())
    }

    pub fn block(&self, name: &str) -> Option<&BlockSlot> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::Mat4;

    fn shader(id: u32, stage: ShaderStage, compiled: bool, source: &str) -> AttachedShader {
        AttachedShader {
            shader: ResourceId(id),
            name: format!("shdr-{id}"),
            stage,
            compiled,
            reflection: ShaderReflection::scan(source),
        }
    }

    const VS: &str = "#version 450\nlayout(location = 0) in vec4 aPosition;\nuniform mat4 uMVP;\nuniform ubTransformStack { mat4 m; } stack;\nvoid main() {}\n";
    const FS: &str = "#version 450\nuniform vec4 uColor;\nuniform mat4 uMVP;\nlayout(location = 0) out vec4 rtFragColor;\nvoid main() {}\n";

    #[test]
    fn links_and_assigns_sorted_locations() {
        let mut p = ProgramRecord::new("prog:draw-col-unif");
        p.attach(shader(1, ShaderStage::Vertex, true, VS)).unwrap();
        p.attach(shader(2, ShaderStage::Fragment, true, FS)).unwrap();
        p.link().unwrap();

        assert_eq!(p.uniform_location("uColor"), Some(UniformLocation(0)));
        assert_eq!(p.uniform_location("uMVP"), Some(UniformLocation(1)));
        assert_eq!(p.uniform_location("uTime"), None);
        assert_eq!(p.uniform_block_index("ubTransformStack"), Some(0));

        p.validate(true).unwrap();
        assert_eq!(
            p.status(),
            ProgramStatus {
                linked: true,
                validated: true
            }
        );
    }

    #[test]
    fn link_rules() {
        let mut no_vs = ProgramRecord::new("a");
        no_vs.attach(shader(2, ShaderStage::Fragment, true, FS)).unwrap();
        assert!(matches!(no_vs.link(), Err(RenderError::LinkFailed { .. })));

        let mut uncompiled = ProgramRecord::new("b");
        uncompiled.attach(shader(1, ShaderStage::Vertex, true, VS)).unwrap();
        uncompiled.attach(shader(2, ShaderStage::Fragment, false, FS)).unwrap();
        assert!(uncompiled.link().is_err());
        assert!(uncompiled.uniform_location("uMVP").is_none());

        let mut two_fs = ProgramRecord::new("c");
        two_fs.attach(shader(1, ShaderStage::Vertex, true, VS)).unwrap();
        two_fs.attach(shader(2, ShaderStage::Fragment, true, FS)).unwrap();
        two_fs.attach(shader(3, ShaderStage::Fragment, true, FS)).unwrap();
        assert!(two_fs.link().is_err());

        let mut dup = ProgramRecord::new("d");
        dup.attach(shader(1, ShaderStage::Vertex, true, VS)).unwrap();
        assert!(dup.attach(shader(1, ShaderStage::Vertex, true, VS)).is_err());
    }

    #[test]
    fn validation_needs_vertex_array_and_known_locations() {
        let mut p = ProgramRecord::new("p");
        assert!(p.validate(true).is_err());

        p.attach(shader(1, ShaderStage::Vertex, true, VS)).unwrap();
        p.link().unwrap();
        assert!(p.validate(false).is_err());
        assert!(p.validate(true).is_ok());

        let odd = "#version 450\nlayout(location = 5) in vec4 aWeird;\nvoid main() {}\n";
        let mut q = ProgramRecord::new("q");
        q.attach(shader(7, ShaderStage::Vertex, true, odd)).unwrap();
        q.link().unwrap();
        assert!(matches!(q.validate(true), Err(RenderError::ValidateFailed { .. })));
    }

    #[test]
    fn uniform_values_are_type_checked() {
        let mut p = ProgramRecord::new("p");
        p.attach(shader(1, ShaderStage::Vertex, true, VS)).unwrap();
        p.link().unwrap();
        let loc = p.uniform_location("uMVP").unwrap();
        assert!(p.set_uniform(loc, UniformValue::Int(0)).is_err());
        p.set_uniform(loc, UniformValue::Mat4(Mat4::IDENTITY)).unwrap();
        assert_eq!(
            p.uniform("uMVP").unwrap().value,
            Some(UniformValue::Mat4(Mat4::IDENTITY))
        );
    }
}
