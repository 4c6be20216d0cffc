//! Vertex layouts, primitive kinds and index formats.

use std::fmt;

/// Vertex attributes in interleave order. Locations follow the shader
/// binding convention used by every vertex shader in the demo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexAttribute {
    Position,
    Normal,
    Color,
    Texcoord,
    Tangent,
    Bitangent,
}

impl VertexAttribute {
    pub const ALL: [VertexAttribute; 6] = [
        VertexAttribute::Position,
        VertexAttribute::Normal,
        VertexAttribute::Color,
        VertexAttribute::Texcoord,
        VertexAttribute::Tangent,
        VertexAttribute::Bitangent,
    ];

    /// Shader input location.
    pub const fn location(self) -> u32 {
        match self {
            VertexAttribute::Position => 0,
            VertexAttribute::Normal => 2,
            VertexAttribute::Color => 3,
            VertexAttribute::Texcoord => 8,
            VertexAttribute::Tangent => 10,
            VertexAttribute::Bitangent => 11,
        }
    }

    pub fn from_location(location: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.location() == location)
    }

    /// Number of `f32` components.
    pub const fn components(self) -> usize {
        match self {
            VertexAttribute::Color => 4,
            VertexAttribute::Texcoord => 2,
            _ => 3,
        }
    }

    const fn bit(self) -> u32 {
        1 << self as u32
    }

    fn short_name(self) -> &'static str {
        match self {
            VertexAttribute::Position => "pos",
            VertexAttribute::Normal => "nrm",
            VertexAttribute::Color => "col",
            VertexAttribute::Texcoord => "tc",
            VertexAttribute::Tangent => "tan",
            VertexAttribute::Bitangent => "btn",
        }
    }
}

/// Set of attributes making up one interleaved vertex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexFormat(u32);

impl VertexFormat {
    pub const POSITION: Self = Self(VertexAttribute::Position.bit());
    pub const POSITION_COLOR: Self =
        Self(VertexAttribute::Position.bit() | VertexAttribute::Color.bit());
    pub const POSITION_NORMAL_TEXCOORD: Self = Self(
        VertexAttribute::Position.bit()
            | VertexAttribute::Normal.bit()
            | VertexAttribute::Texcoord.bit(),
    );
    pub const TANGENT_BASIS_TEXCOORD: Self = Self(
        VertexAttribute::Position.bit()
            | VertexAttribute::Normal.bit()
            | VertexAttribute::Texcoord.bit()
            | VertexAttribute::Tangent.bit()
            | VertexAttribute::Bitangent.bit(),
    );

    /// Rebuild from raw bits. Every format must contain a position.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let known = VertexAttribute::ALL.iter().fold(0, |acc, a| acc | a.bit());
        let valid = bits & !known == 0 && bits & VertexAttribute::Position.bit() != 0;
        valid.then_some(Self(bits))
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn contains(self, attribute: VertexAttribute) -> bool {
        self.0 & attribute.bit() != 0
    }

    pub fn with(self, attribute: VertexAttribute) -> Self {
        Self(self.0 | attribute.bit())
    }

    pub fn attributes(self) -> impl Iterator<Item = VertexAttribute> {
        VertexAttribute::ALL
            .into_iter()
            .filter(move |a| self.contains(*a))
    }

    pub fn attribute_count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn floats_per_vertex(self) -> usize {
        self.attributes().map(VertexAttribute::components).sum()
    }

    /// Bytes per vertex.
    pub fn stride(self) -> u64 {
        (self.floats_per_vertex() * std::mem::size_of::<f32>()) as u64
    }

    /// Offset of `attribute` within a vertex, in floats.
    pub fn float_offset(self, attribute: VertexAttribute) -> Option<usize> {
        if !self.contains(attribute) {
            return None;
        }
        Some(
            self.attributes()
                .take_while(|a| *a != attribute)
                .map(VertexAttribute::components)
                .sum(),
        )
    }

    /// Short label such as `pos+nrm+tc`.
    pub fn label(self) -> String {
        self.attributes()
            .map(VertexAttribute::short_name)
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Debug for VertexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VertexFormat({})", self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    Triangles,
}

impl Primitive {
    pub fn code(self) -> u32 {
        match self {
            Primitive::Points => 0,
            Primitive::Lines => 1,
            Primitive::Triangles => 4,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Primitive::Points),
            1 => Some(Primitive::Lines),
            4 => Some(Primitive::Triangles),
            _ => None,
        }
    }

    /// Vertices per primitive.
    pub fn arity(self) -> usize {
        match self {
            Primitive::Points => 1,
            Primitive::Lines => 2,
            Primitive::Triangles => 3,
        }
    }
}

/// Index element type shared by every drawable in one buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U8,
    U16,
    U32,
}

impl IndexFormat {
    /// Smallest index type able to address `vertex_count` vertices.
    pub fn for_vertex_count(vertex_count: u32) -> Self {
        if vertex_count <= 1 << 8 {
            IndexFormat::U8
        } else if vertex_count <= 1 << 16 {
            IndexFormat::U16
        } else {
            IndexFormat::U32
        }
    }

    pub fn bytes(self) -> u64 {
        match self {
            IndexFormat::U8 => 1,
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }

    pub fn storage_required(self, index_count: u32) -> u64 {
        u64::from(index_count) * self.bytes()
    }

    /// Narrow `indices` to this format. Indices are assumed to fit, which
    /// holds whenever the format came from [`IndexFormat::for_vertex_count`]
    /// over a superset of the indexed vertices.
    pub fn encode(self, indices: &[u32]) -> Vec<u8> {
        match self {
            IndexFormat::U8 => indices.iter().map(|&i| i as u8).collect(),
            IndexFormat::U16 => {
                let narrowed: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrowed).to_vec()
            }
            IndexFormat::U32 => bytemuck::cast_slice(indices).to_vec(),
        }
    }
}
