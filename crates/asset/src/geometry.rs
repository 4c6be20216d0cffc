//! Packed geometry records: interleaved vertices plus optional indices.

use crate::format::{IndexFormat, Primitive, VertexFormat};

/// One geometry record, ready to be cached or uploaded.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryData {
    pub format: VertexFormat,
    pub primitive: Primitive,
    /// Interleaved vertex attributes in [`VertexFormat::attributes`] order.
    pub vertex_data: Vec<f32>,
    /// Empty for non-indexed geometry.
    pub indices: Vec<u32>,
}

impl GeometryData {
    pub fn new(
        format: VertexFormat,
        primitive: Primitive,
        vertex_data: Vec<f32>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            format,
            primitive,
            vertex_data,
            indices,
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        (self.vertex_data.len() / self.format.floats_per_vertex()) as u32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Elements a draw call consumes: indices if indexed, vertices otherwise.
    pub fn element_count(&self) -> u32 {
        if self.is_indexed() {
            self.index_count()
        } else {
            self.vertex_count()
        }
    }

    /// Bytes of vertex storage this record needs.
    pub fn vertex_buffer_size(&self) -> u64 {
        (self.vertex_data.len() * std::mem::size_of::<f32>()) as u64
    }

    /// Bytes of index storage this record needs under `format`.
    pub fn index_storage(&self, format: IndexFormat) -> u64 {
        format.storage_required(self.index_count())
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertex_data)
    }

    /// Whole vertices only, every index in range.
    pub fn is_valid(&self) -> bool {
        let floats = self.format.floats_per_vertex();
        let vertex_count = self.vertex_count();
        !self.vertex_data.is_empty()
            && self.vertex_data.len() % floats == 0
            && self.indices.iter().all(|&i| i < vertex_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_format() {
        let g = GeometryData::new(
            VertexFormat::POSITION_COLOR,
            Primitive::Lines,
            vec![0.0; 7 * 6],
            Vec::new(),
        );
        assert!(g.is_valid());
        assert!(!g.is_indexed());
        assert_eq!(g.vertex_count(), 6);
        assert_eq!(g.element_count(), 6);
        assert_eq!(g.vertex_buffer_size(), 6 * 28);
        assert_eq!(g.index_storage(IndexFormat::U32), 0);
    }

    #[test]
    fn out_of_range_index_is_invalid() {
        let g = GeometryData::new(
            VertexFormat::POSITION,
            Primitive::Lines,
            vec![0.0; 6],
            vec![0, 2],
        );
        assert!(!g.is_valid());
    }
}
