//! Minimal GLSL declaration scanner.
//!
//! Only global declarations are looked at: default-block uniforms, named
//! uniform blocks and vertex inputs with their `layout(location = N)`.
//! Function bodies and parameter lists are skipped.

use std::fmt;

use crate::device::UniformValue;

/// Uniform types the loader sets defaults for; anything else is `Other`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GlslType {
    Int,
    Float,
    Double,
    Vec4,
    Mat4,
    Sampler,
    Other(String),
}

impl GlslType {
    fn parse(token: &str) -> Self {
        match token {
            "int" | "uint" | "bool" => GlslType::Int,
            "float" => GlslType::Float,
            "double" => GlslType::Double,
            "vec4" => GlslType::Vec4,
            "mat4" => GlslType::Mat4,
            t if t.starts_with("sampler")
                || t.starts_with("isampler")
                || t.starts_with("usampler")
                || t.starts_with("image") =>
            {
                GlslType::Sampler
            }
            other => GlslType::Other(other.to_owned()),
        }
    }

    /// Whether `value` may be sent to a uniform of this type.
    pub fn accepts(&self, value: &UniformValue) -> bool {
        matches!(
            (self, value),
            (GlslType::Int | GlslType::Sampler, UniformValue::Int(_))
                | (GlslType::Double, UniformValue::Double(_))
                | (GlslType::Vec4, UniformValue::Vec4(_))
                | (GlslType::Mat4, UniformValue::Mat4(_))
        )
    }
}

impl fmt::Display for GlslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlslType::Int => f.write_str("int"),
            GlslType::Float => f.write_str("float"),
            GlslType::Double => f.write_str("double"),
            GlslType::Vec4 => f.write_str("vec4"),
            GlslType::Mat4 => f.write_str("mat4"),
            GlslType::Sampler => f.write_str("sampler"),
            GlslType::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: GlslType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputDecl {
    pub name: String,
    pub location: Option<u32>,
}

/// Everything the link and validate steps need to know about one shader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    pub uniforms: Vec<UniformDecl>,
    pub blocks: Vec<String>,
    pub inputs: Vec<InputDecl>,
}

impl ShaderReflection {
    pub fn scan(source: &str) -> Self {
        Scanner::new(tokenize(source)).run()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(u32),
    Punct(char),
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line_start = true;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line_start = true,
            c if c.is_whitespace() => {}
            '#' if line_start => {
                // preprocessor line, honouring backslash continuations
                let mut prev = '#';
                for n in chars.by_ref() {
                    if n == '\n' && prev != '\\' {
                        break;
                    }
                    prev = n;
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                line_start = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                line_start = false;
                let mut ident = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            c if c.is_ascii_digit() => {
                line_start = false;
                let mut digits = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '.' {
                        digits.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // float literals and suffixed ints only matter as placeholders
                tokens.push(Token::Number(digits.parse().unwrap_or(0)));
            }
            other => {
                line_start = false;
                tokens.push(Token::Punct(other));
            }
        }
    }
    tokens
}

const SKIPPED_QUALIFIERS: &[&str] = &[
    "highp", "mediump", "lowp", "flat", "smooth", "noperspective", "centroid", "sample",
    "invariant", "precise", "const",
];

struct Scanner {
    tokens: Vec<Token>,
    pos: usize,
    out: ShaderReflection,
}

impl Scanner {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            out: ShaderReflection::default(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn run(mut self) -> ShaderReflection {
        let mut location = None;
        while let Some(token) = self.next() {
            match token {
                Token::Ident(ref word) if word == "layout" => {
                    location = self.layout_location();
                    continue;
                }
                Token::Ident(ref word) if SKIPPED_QUALIFIERS.contains(&word.as_str()) => continue,
                Token::Ident(ref word) if word == "uniform" => self.uniform(),
                Token::Ident(ref word) if word == "in" => self.input(location),
                Token::Punct('{') => self.skip_balanced('{', '}'),
                Token::Punct('(') => self.skip_balanced('(', ')'),
                _ => {}
            }
            location = None;
        }
        self.out
    }

    /// After `layout`: read `( ... )` and return `location = N` if present.
    fn layout_location(&mut self) -> Option<u32> {
        if self.peek() != Some(&Token::Punct('(')) {
            return None;
        }
        self.next();
        let mut location = None;
        while let Some(token) = self.next() {
            match token {
                Token::Punct(')') => break,
                Token::Ident(ref word) if word == "location" => {
                    if self.peek() == Some(&Token::Punct('=')) {
                        self.next();
                        if let Some(Token::Number(n)) = self.next() {
                            location = Some(n);
                        }
                    }
                }
                _ => {}
            }
        }
        location
    }

    fn skip_qualifiers(&mut self) {
        while let Some(Token::Ident(word)) = self.peek() {
            if SKIPPED_QUALIFIERS.contains(&word.as_str()) {
                self.next();
            } else {
                break;
            }
        }
    }

    fn uniform(&mut self) {
        self.skip_qualifiers();
        let Some(Token::Ident(first)) = self.next() else {
            return;
        };
        if self.peek() == Some(&Token::Punct('{')) {
            self.next();
            self.skip_balanced('{', '}');
            self.skip_past(';');
            self.out.blocks.push(first);
            return;
        }
        let ty = GlslType::parse(&first);
        for name in self.declarators() {
            self.out.uniforms.push(UniformDecl {
                name,
                ty: ty.clone(),
            });
        }
    }

    fn input(&mut self, location: Option<u32>) {
        self.skip_qualifiers();
        let Some(Token::Ident(_ty)) = self.next() else {
            return;
        };
        // interface blocks (`in Block { ... } name;`) carry no locations we use
        if self.peek() == Some(&Token::Punct('{')) {
            self.next();
            self.skip_balanced('{', '}');
            self.skip_past(';');
            return;
        }
        for (i, name) in self.declarators().into_iter().enumerate() {
            self.out.inputs.push(InputDecl {
                name,
                location: location.map(|l| l + i as u32),
            });
        }
    }

    /// `a, b[4], c;` -> names, consuming the terminating `;`.
    fn declarators(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        let mut expect_name = true;
        while let Some(token) = self.next() {
            match token {
                Token::Punct(';') => break,
                Token::Punct(',') => expect_name = true,
                Token::Punct('[') => self.skip_balanced('[', ']'),
                Token::Punct('=') => {
                    // initializer: skip to the next top-level ',' or ';'
                    while let Some(t) = self.peek() {
                        match t {
                            Token::Punct(',') | Token::Punct(';') => break,
                            Token::Punct('(') => {
                                self.next();
                                self.skip_balanced('(', ')');
                            }
                            _ => {
                                self.next();
                            }
                        }
                    }
                }
                Token::Ident(name) if expect_name => {
                    names.push(name);
                    expect_name = false;
                }
                _ => {}
            }
        }
        names
    }

    /// Called just after an opening delimiter.
    fn skip_balanced(&mut self, open: char, close: char) {
        let mut depth = 1usize;
        while let Some(token) = self.next() {
            match token {
                Token::Punct(c) if c == open => depth += 1,
                Token::Punct(c) if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn skip_past(&mut self, end: char) {
        while let Some(token) = self.next() {
            if token == Token::Punct(end) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"#version 450
// passes the tangent basis along
#define MAX_LIGHTS 4

layout (location = 0) in vec4 aPosition;
layout (location = 2) in vec3 aNormal;
layout(location=8) in vec2 aTexcoord;

uniform mat4 uMVP, uMV_nrm;
uniform highp int uIndex;
uniform sampler2D uTex_dm;
uniform double uTime;
uniform float uWeights[4];

uniform ubLight {
    vec4 position[MAX_LIGHTS];
    float radius;
} light;

out vec4 vTexcoord;

/* in vec3 commented_out; */
vec4 helper(in vec4 p) { return p; }

void main() {
    vTexcoord = vec4(aTexcoord, 0.0, 1.0);
    gl_Position = uMVP * aPosition;
}
"#;

    #[test]
    fn scans_uniforms_blocks_and_inputs() {
        let r = ShaderReflection::scan(VS);
        let names: Vec<_> = r.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["uMVP", "uMV_nrm", "uIndex", "uTex_dm", "uTime", "uWeights"]);
        assert_eq!(r.uniforms[0].ty, GlslType::Mat4);
        assert_eq!(r.uniforms[2].ty, GlslType::Int);
        assert_eq!(r.uniforms[3].ty, GlslType::Sampler);
        assert_eq!(r.uniforms[4].ty, GlslType::Double);
        assert_eq!(r.blocks, ["ubLight"]);

        let locations: Vec<_> = r.inputs.iter().map(|i| i.location).collect();
        assert_eq!(locations, [Some(0), Some(2), Some(8)]);
    }

    #[test]
    fn type_acceptance() {
        assert!(GlslType::Sampler.accepts(&UniformValue::Int(3)));
        assert!(GlslType::Mat4.accepts(&UniformValue::Mat4(corelib::Mat4::IDENTITY)));
        assert!(!GlslType::Float.accepts(&UniformValue::Double(0.0)));
        assert!(!GlslType::Other("vec3".into()).accepts(&UniformValue::Int(0)));
    }

    #[test]
    fn unlocated_inputs_are_kept_without_location() {
        let r = ShaderReflection::scan("#version 450\nin vec3 vNormal;\nvoid main() {}\n");
        assert_eq!(
            r.inputs,
            [InputDecl {
                name: "vNormal".into(),
                location: None
            }]
        );
    }
}
