//! Scene geometry: shape tables, the positional cache and upload into one
//! shared buffer.
//!
//! Records are produced in table order (display shapes, procedural shapes,
//! loaded models) and that order is the cache's only schema.

use std::{
    fs::{self, File},
    io::{BufWriter, ErrorKind, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use asset::{
    Axis, GeometryData, GeometryFlags, GeometryStreamReader, GeometryStreamWriter, IndexFormat,
    ModelFlags, Shape, ShapeDescriptor, load_model,
};
use glam::Mat4;
use renderer::{BufferUsage, RenderDevice};
use tempfile::NamedTempFile;

use crate::config::LoadConfig;
use crate::report::{LoadIssueKind, LoadReport};
use crate::state::{DemoState, Drawable, DrawableSlot, GeometrySource, SceneBuffer, VertexArray, VertexArraySlot};

pub const SCENE_BUFFER_NAME: &str = "vbo+ibo:scene";

#[derive(Clone, Copy, Debug)]
pub struct ShapeRow {
    pub slot: DrawableSlot,
    pub shape: ShapeDescriptor,
}

#[derive(Clone, Copy, Debug)]
pub struct ModelRow {
    pub slot: DrawableSlot,
    /// Relative to the resource directory.
    pub path: &'static str,
    pub transform: Mat4,
    pub flags: ModelFlags,
}

/// Helpers drawn as lines.
pub fn display_shapes() -> [ShapeRow; 2] {
    [
        ShapeRow {
            slot: DrawableSlot::Axes,
            shape: ShapeDescriptor::axes(1.0),
        },
        ShapeRow {
            slot: DrawableSlot::Grid,
            shape: ShapeDescriptor::plane(GeometryFlags::WIREFRAME, Axis::Z, 20.0, 20.0, 20, 20),
        },
    ]
}

/// Unit solids with texcoords and normals.
pub fn procedural_shapes() -> [ShapeRow; 7] {
    let solid = |slot, shape| ShapeRow {
        slot,
        shape: ShapeDescriptor::new(shape, GeometryFlags::TEXCOORDS_NORMALS),
    };
    [
        ShapeRow {
            slot: DrawableSlot::UnitPlaneZ,
            shape: ShapeDescriptor::plane(GeometryFlags::TEXCOORDS_NORMALS, Axis::Z, 1.0, 1.0, 1, 1),
        },
        solid(
            DrawableSlot::UnitBox,
            Shape::Box {
                width: 1.0,
                height: 1.0,
                depth: 1.0,
                width_divisions: 1,
                height_divisions: 1,
                depth_divisions: 1,
            },
        ),
        solid(
            DrawableSlot::UnitSphere,
            Shape::Sphere {
                axis: Axis::Z,
                radius: 1.0,
                slices: 32,
                stacks: 24,
            },
        ),
        solid(
            DrawableSlot::UnitCylinder,
            Shape::Cylinder {
                axis: Axis::X,
                radius: 1.0,
                length: 1.0,
                slices: 32,
                stacks: 4,
                rings: 4,
            },
        ),
        solid(
            DrawableSlot::UnitCapsule,
            Shape::Capsule {
                axis: Axis::X,
                radius: 1.0,
                length: 1.0,
                slices: 32,
                stacks: 12,
                rings: 4,
            },
        ),
        solid(
            DrawableSlot::UnitTorus,
            Shape::Torus {
                axis: Axis::X,
                major_radius: 1.0,
                minor_radius: 0.25,
                slices: 32,
                stacks: 24,
            },
        ),
        solid(
            DrawableSlot::UnitCone,
            Shape::Cone {
                axis: Axis::X,
                radius: 1.0,
                length: 1.0,
                slices: 32,
                stacks: 1,
                rings: 1,
            },
        ),
    ]
}

/// The teapot is scaled by 0.05 with its axes rotated: X becomes Y, Y
/// becomes Z and Z becomes X.
pub fn loaded_models() -> [ModelRow; 1] {
    #[rustfmt::skip]
    let teapot = Mat4::from_cols_array(&[
        0.0, 0.05, 0.0, 0.0,
        0.0, 0.0, 0.05, 0.0,
        0.05, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]);
    [ModelRow {
        slot: DrawableSlot::Teapot,
        path: "obj/teapot/teapot.obj",
        transform: teapot,
        flags: ModelFlags::CALCULATE_TANGENTS,
    }]
}

/// Drawable slots in record order.
pub fn record_slots() -> Vec<DrawableSlot> {
    display_shapes()
        .iter()
        .chain(procedural_shapes().iter())
        .map(|row| row.slot)
        .chain(loaded_models().iter().map(|row| row.slot))
        .collect()
}

/// Populate the scene buffer, vertex arrays and drawables, reading from the
/// cache when streaming and the cache is usable, generating otherwise.
pub fn load_geometry(
    device: &mut dyn RenderDevice,
    state: &mut DemoState,
    config: &LoadConfig,
) -> Result<()> {
    if state.scene_buffer.is_some() {
        bail!("scene geometry is already loaded");
    }
    let slots = record_slots();

    let cached = if config.streaming {
        read_cache(config, &slots, &mut state.report)
    } else {
        None
    };
    let (records, source) = match cached {
        Some(records) => (records, GeometrySource::Cache),
        None => generate(config)?,
    };

    upload(device, state, slots.into_iter().zip(records).collect())?;
    state.geometry_source = Some(source);
    Ok(())
}

/// `None` when there is no cache or it could not be used.
fn read_cache(
    config: &LoadConfig,
    slots: &[DrawableSlot],
    report: &mut LoadReport,
) -> Option<Vec<GeometryData>> {
    let path = &config.cache_path;
    let mut reader = match GeometryStreamReader::open(path) {
        Ok(reader) => reader,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No geometry cache at {}, generating", path.display());
            return None;
        }
        Err(e) => {
            log::warn!("Cannot open geometry cache {}: {e}", path.display());
            return None;
        }
    };

    match read_records(&mut reader, slots) {
        Ok(records) => {
            log::info!("Read {} geometry records from {}", records.len(), path.display());
            Some(records)
        }
        Err((index, e)) => {
            log::warn!("Geometry cache {} is unusable, regenerating: {e:#}", path.display());
            report.push(
                LoadIssueKind::CacheUnusable,
                index,
                path.display().to_string(),
                format!("{e:#}"),
            );
            None
        }
    }
}

/// Read one record per slot, checking each against the slot's layout. The
/// error carries the index of the record that could not be used.
fn read_records<R: Read>(
    reader: &mut GeometryStreamReader<R>,
    slots: &[DrawableSlot],
) -> Result<Vec<GeometryData>, (usize, anyhow::Error)> {
    let mut records = Vec::with_capacity(slots.len());
    for (index, slot) in slots.iter().enumerate() {
        let record = reader.read_record().map_err(|e| (index, e))?;
        let expected = slot.vertex_array().format();
        if record.format != expected {
            return Err((
                index,
                anyhow!(
                    "Record {index} ({}) has layout {}, expected {}",
                    slot.name(),
                    record.format.label(),
                    expected.label()
                ),
            ));
        }
        records.push(record);
    }
    Ok(records)
}

fn generate(config: &LoadConfig) -> Result<(Vec<GeometryData>, GeometrySource)> {
    let mut records = Vec::new();
    for row in display_shapes().iter().chain(procedural_shapes().iter()) {
        let record = row
            .shape
            .generate()
            .with_context(|| format!("Failed to generate {}", row.slot.name()))?;
        records.push(record);
    }
    for row in loaded_models() {
        let record = load_model(config.resource(row.path), row.transform, row.flags)
            .with_context(|| format!("Failed to load {}", row.slot.name()))?;
        records.push(record);
    }
    log::info!("Generated {} geometry records", records.len());

    let cached = config.streaming
        && match write_cache(&config.cache_path, &records) {
            Ok(()) => {
                log::info!("Wrote geometry cache {}", config.cache_path.display());
                true
            }
            Err(e) => {
                log::warn!(
                    "Cannot write geometry cache {}, continuing uncached: {e:#}",
                    config.cache_path.display()
                );
                false
            }
        };
    Ok((records, GeometrySource::Generated { cached }))
}

/// Write every record to a temporary file next to `path` and move it into
/// place once complete. The cache at `path` is either the old one or a full
/// new one, never partial.
fn write_cache(path: &Path, records: &[GeometryData]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;

    if let Err(e) = write_records(file.as_file_mut(), records) {
        let temp = file.path().to_path_buf();
        if let Err(close) = file.close() {
            log::warn!("Failed to remove partial geometry cache {}: {close}", temp.display());
        }
        return Err(e);
    }

    file.persist(path)
        .with_context(|| format!("Failed to move geometry cache into {}", path.display()))?;
    Ok(())
}

fn write_records(file: &mut File, records: &[GeometryData]) -> Result<()> {
    let mut writer = GeometryStreamWriter::new(BufWriter::new(file));
    for record in records {
        writer.write_record(record)?;
    }
    writer.finish().map(drop)
}

/// Upload every record into one buffer: all vertices first, then all indices
/// under a common index format. Records sharing a layout share a vertex
/// array, so they are laid out contiguously.
fn upload(
    device: &mut dyn RenderDevice,
    state: &mut DemoState,
    mut records: Vec<(DrawableSlot, GeometryData)>,
) -> Result<()> {
    let mut layouts: Vec<VertexArraySlot> = Vec::new();
    for (slot, record) in &records {
        let layout = VertexArraySlot::for_format(record.format).ok_or_else(|| {
            anyhow!("{} uses unsupported vertex layout {}", slot.name(), record.format.label())
        })?;
        if !layouts.contains(&layout) {
            layouts.push(layout);
        }
    }
    records.sort_by_key(|(_, record)| {
        layouts
            .iter()
            .position(|l| l.format() == record.format)
            .unwrap_or(usize::MAX)
    });

    let vertex_count: u32 = records.iter().map(|(_, r)| r.vertex_count()).sum();
    let index_format = IndexFormat::for_vertex_count(vertex_count);
    let vertex_capacity: u64 = records.iter().map(|(_, r)| r.vertex_buffer_size()).sum();
    let index_capacity: u64 = records.iter().map(|(_, r)| r.index_storage(index_format)).sum();

    let handle = device
        .create_buffer(SCENE_BUFFER_NAME, BufferUsage::DrawData, vertex_capacity + index_capacity)
        .context("Failed to create the scene buffer")?;
    let buffer = handle.id();
    // owned by the state from here on, so a failed upload still releases it
    let scene = state.scene_buffer.insert(SceneBuffer {
        handle,
        vertex_capacity,
        index_capacity,
        vertex_used: 0,
        index_used: 0,
        index_format,
    });

    for (slot, record) in records {
        let layout = slot.vertex_array();
        ensure!(
            layout.format() == record.format,
            "{} has layout {}, expected {}",
            slot.name(),
            record.format.label(),
            layout.format().label()
        );

        let vertex_offset = scene.vertex_used;
        if !state.vertex_arrays.contains_key(&layout) {
            let vao = device
                .create_vertex_array(layout.name(), buffer, record.format, vertex_offset)
                .with_context(|| format!("Failed to create {}", layout.name()))?;
            state.vertex_arrays.insert(
                layout,
                VertexArray {
                    handle: vao,
                    buffer,
                    format: record.format,
                    offset: vertex_offset,
                },
            );
        }
        let vao = &state.vertex_arrays[&layout];
        let base_vertex = ((vertex_offset - vao.offset) / record.format.stride()) as u32;

        let vertex_bytes = record.vertex_buffer_size();
        device
            .write_buffer(buffer, vertex_offset, record.vertex_bytes())
            .with_context(|| format!("Failed to upload vertices of {}", slot.name()))?;
        scene.vertex_used += vertex_bytes;

        let (index_offset, index_bytes) = if record.is_indexed() {
            let offset = scene.index_base() + scene.index_used;
            let bytes = index_format.encode(&record.indices);
            device
                .write_buffer(buffer, offset, &bytes)
                .with_context(|| format!("Failed to upload indices of {}", slot.name()))?;
            scene.index_used += bytes.len() as u64;
            (offset, bytes.len() as u64)
        } else {
            (0, 0)
        };

        let indexed = record.is_indexed();
        state.drawables.insert(
            slot,
            Drawable {
                vertex_array: vao.handle.id(),
                index_buffer: indexed.then_some(buffer),
                primitive: record.primitive,
                count: record.element_count(),
                vertex_count: record.vertex_count(),
                vertex_offset,
                vertex_bytes,
                base_vertex,
                index_format: indexed.then_some(index_format),
                index_offset,
                index_bytes,
            },
        );
        log::debug!(
            "{}: {} elements at vertex offset {vertex_offset}",
            slot.name(),
            record.element_count()
        );
    }

    ensure!(
        scene.vertex_used == scene.vertex_capacity && scene.index_used == scene.index_capacity,
        "scene buffer accounting mismatch ({scene:?})"
    );
    log::info!(
        "Uploaded {} drawables: {} vertex bytes, {} index bytes ({:?})",
        state.drawables.len(),
        scene.vertex_capacity,
        scene.index_capacity,
        index_format
    );
    state.dummy_drawable = state.drawables.get(&DrawableSlot::Grid).map(Drawable::as_dummy);
    Ok(())
}
