//! Positional geometry cache.
//!
//! The file is a plain sequence of records with no file header: the order in
//! which records were written is the only schema, so a reader must ask for
//! them in the same order and count. Each record is
//!
//! ```text
//! u32 format bits | u32 primitive | u32 vertex count | u32 index count
//! f32 * (vertex count * floats per vertex)
//! u32 * index count
//! ```
//!
//! in native byte order; the cache is a machine-local artifact.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};

use crate::format::{Primitive, VertexFormat};
use crate::geometry::GeometryData;

/// Refuse records claiming more than this many vertices or indices.
const MAX_ELEMENTS: u32 = 1 << 26;

const HEADER_BYTES: u64 = 16;

/// Reads records back in the order they were written.
pub struct GeometryStreamReader<R: Read> {
    inner: R,
    records: usize,
    /// Bytes left in the stream, when known.
    remaining: Option<u64>,
}

impl GeometryStreamReader<BufReader<File>> {
    /// Open a cache file. A missing file is an ordinary cache miss for callers.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::with_len(BufReader::new(file), len))
    }
}

impl<R: Read> GeometryStreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            records: 0,
            remaining: None,
        }
    }

    /// A reader over a stream of `len` bytes. Records claiming more data
    /// than is left are rejected before anything is allocated for them.
    pub fn with_len(inner: R, len: u64) -> Self {
        Self {
            inner,
            records: 0,
            remaining: Some(len),
        }
    }

    /// Records read so far.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn read_record(&mut self) -> Result<GeometryData> {
        let index = self.records;
        let mut header = [0u32; 4];
        self.inner
            .read_exact(bytemuck::cast_slice_mut(&mut header))
            .with_context(|| format!("Failed to read header of geometry record {index}"))?;
        self.consume(HEADER_BYTES);
        let [format_bits, primitive_code, vertex_count, index_count] = header;

        let format = VertexFormat::from_bits(format_bits)
            .ok_or_else(|| anyhow!("Record {index}: unknown vertex format bits {format_bits:#x}"))?;
        let primitive = Primitive::from_code(primitive_code)
            .ok_or_else(|| anyhow!("Record {index}: unknown primitive {primitive_code}"))?;
        if vertex_count > MAX_ELEMENTS || index_count > MAX_ELEMENTS {
            anyhow::bail!(
                "Record {index}: implausible size ({vertex_count} vertices, {index_count} indices)"
            );
        }
        let payload = (u64::from(vertex_count) * format.floats_per_vertex() as u64
            + u64::from(index_count))
            * 4;
        if let Some(remaining) = self.remaining {
            if payload > remaining {
                anyhow::bail!(
                    "Record {index}: claims {payload} bytes of data but only {remaining} remain"
                );
            }
        }

        let mut vertex_data = vec![0f32; vertex_count as usize * format.floats_per_vertex()];
        self.inner
            .read_exact(bytemuck::cast_slice_mut(&mut vertex_data))
            .with_context(|| format!("Failed to read vertices of geometry record {index}"))?;
        let mut indices = vec![0u32; index_count as usize];
        self.inner
            .read_exact(bytemuck::cast_slice_mut(&mut indices))
            .with_context(|| format!("Failed to read indices of geometry record {index}"))?;
        self.consume(payload);

        let record = GeometryData::new(format, primitive, vertex_data, indices);
        if !record.is_valid() {
            anyhow::bail!("Record {index}: indices out of range");
        }
        self.records += 1;
        Ok(record)
    }

    /// Read exactly `count` records.
    pub fn read_records(&mut self, count: usize) -> Result<Vec<GeometryData>> {
        (0..count).map(|_| self.read_record()).collect()
    }

    fn consume(&mut self, bytes: u64) {
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(bytes);
        }
    }
}

/// Writes records in call order.
pub struct GeometryStreamWriter<W: Write> {
    inner: W,
    records: usize,
}

impl GeometryStreamWriter<BufWriter<File>> {
    /// Create (or truncate) a cache file, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> GeometryStreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn write_record(&mut self, record: &GeometryData) -> Result<()> {
        let header = [
            record.format.bits(),
            record.primitive.code(),
            record.vertex_count(),
            record.index_count(),
        ];
        self.inner.write_all(bytemuck::cast_slice(&header))?;
        self.inner.write_all(record.vertex_bytes())?;
        self.inner.write_all(bytemuck::cast_slice(&record.indices))?;
        self.records += 1;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush().context("Failed to flush geometry cache")?;
        Ok(self.inner)
    }
}
