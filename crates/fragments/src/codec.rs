//! Binary `.frag` format.
//!
//! Layout: 4-byte magic `FRAG`, little-endian `u16` version, little-endian
//! `u16` flags, then a MessagePack payload (optionally gzip-compressed when
//! flag bit 0 is set) holding a [`ModelRecord`].
//!
//! Decoding is a pure function over bytes, so it may run on any thread; only
//! [`DecodedModel::instantiate`] touches the shared pool.

use std::{collections::HashMap, io::Read};

use corelib::Mat4;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};

use crate::{
    error::{FragmentError, Result},
    fragment::{CategoryId, EntityId, Fragment, Instance},
    group::FragmentGroup,
    pool::{ShapeId, SharedPool},
    properties::PropertyTable,
    shape::{MeshData, Shape, ShapeVertex},
};

pub const MAGIC: [u8; 4] = *b"FRAG";
pub const VERSION: u16 = 1;
pub const FILE_EXTENSION: &str = "frag";

const HEADER_LEN: usize = 8;
const FLAG_GZIP: u16 = 1;
const KNOWN_FLAGS: u16 = FLAG_GZIP;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    /// Gzip the payload. Geometry buffers usually shrink a lot.
    pub compress: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

#[derive(Serialize, Deserialize)]
struct ModelRecord {
    name: String,
    origin: [f32; 16],
    shapes: Vec<ShapeRecord>,
    fragments: Vec<FragmentRecord>,
    properties: Option<PropertyTable>,
}

#[derive(Serialize, Deserialize)]
struct ShapeRecord {
    hash: u64,
    vertices: Vec<ShapeVertex>,
    indices: Vec<u32>,
}

#[derive(Serialize, Deserialize)]
struct FragmentRecord {
    /// Index into `ModelRecord::shapes`.
    shape: u32,
    instances: Vec<InstanceRecord>,
}

#[derive(Serialize, Deserialize)]
struct InstanceRecord {
    transform: [f32; 16],
    entity: EntityId,
    category: Option<CategoryId>,
}

pub(crate) fn encode(group: &FragmentGroup, options: &ExportOptions) -> Result<Vec<u8>> {
    let mut shapes = Vec::new();
    let mut shape_slots: HashMap<ShapeId, u32> = HashMap::new();
    let mut fragments = Vec::with_capacity(group.fragment_count()?);

    for (_, fragment) in group.fragments()? {
        let shape_id = fragment.shape_id()?;
        let slot = match shape_slots.get(&shape_id) {
            Some(&slot) => slot,
            None => {
                let shape = fragment.shape()?;
                let slot = shapes.len() as u32;
                shapes.push(ShapeRecord {
                    hash: shape.hash(),
                    vertices: shape.vertices().to_vec(),
                    indices: shape.indices().to_vec(),
                });
                shape_slots.insert(shape_id, slot);
                slot
            }
        };
        let instances = fragment
            .instances()?
            .iter()
            .map(|i| InstanceRecord {
                transform: i.transform.to_cols_array(),
                entity: i.entity,
                category: i.category,
            })
            .collect();
        fragments.push(FragmentRecord {
            shape: slot,
            instances,
        });
    }

    let record = ModelRecord {
        name: group.name()?.to_owned(),
        origin: group.origin()?.to_cols_array(),
        shapes,
        fragments,
        properties: group.get_local_properties()?.cloned(),
    };

    let flags = if options.compress { FLAG_GZIP } else { 0 };
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());

    let encode_err = |e: rmp_serde::encode::Error| FragmentError::Encode(e.to_string());
    if options.compress {
        let mut writer = GzEncoder::new(out, Compression::default());
        rmp_serde::encode::write(&mut writer, &record).map_err(encode_err)?;
        out = writer
            .finish()
            .map_err(|e| FragmentError::Encode(e.to_string()))?;
    } else {
        rmp_serde::encode::write(&mut out, &record).map_err(encode_err)?;
    }

    log::info!(
        "Exported '{}': {} shapes, {} fragments, {} bytes",
        record.name,
        record.shapes.len(),
        record.fragments.len(),
        out.len()
    );
    Ok(out)
}

/// Validated content of a `.frag` file, not yet registered anywhere.
/// Only [`decode`] builds one.
#[derive(Debug)]
pub struct DecodedModel {
    name: String,
    origin: Mat4,
    shapes: Vec<Shape>,
    /// (index into `shapes`, instances)
    fragments: Vec<(usize, Vec<Instance>)>,
    properties: Option<PropertyTable>,
}

fn corrupt(reason: impl Into<String>) -> FragmentError {
    FragmentError::CorruptData(reason.into())
}

pub fn decode(bytes: &[u8]) -> Result<DecodedModel> {
    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[..4] != MAGIC {
        return Err(corrupt("bad magic number"));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    let flags = u16::from_le_bytes([header[6], header[7]]);
    if flags & !KNOWN_FLAGS != 0 {
        return Err(corrupt(format!("unknown flags {flags:#06x}")));
    }

    let inflated;
    let mut payload: &[u8] = if flags & FLAG_GZIP != 0 {
        let mut buf = Vec::new();
        GzDecoder::new(payload)
            .read_to_end(&mut buf)
            .map_err(|e| corrupt(format!("gzip payload: {e}")))?;
        inflated = buf;
        &inflated
    } else {
        payload
    };
    let record: ModelRecord = rmp_serde::decode::from_read(&mut payload)
        .map_err(|e| corrupt(format!("payload: {e}")))?;
    if !payload.is_empty() {
        return Err(corrupt(format!("{} trailing bytes", payload.len())));
    }

    let mut shapes = Vec::with_capacity(record.shapes.len());
    for (i, rec) in record.shapes.into_iter().enumerate() {
        let shape = Shape::new(MeshData::new(rec.vertices, rec.indices)).map_err(|e| match e {
            FragmentError::InvalidGeometry(reason) => corrupt(format!("shape {i}: {reason}")),
            other => other,
        })?;
        if shape.hash() != rec.hash {
            return Err(corrupt(format!("shape {i}: content hash mismatch")));
        }
        shapes.push(shape);
    }

    let mut fragments = Vec::with_capacity(record.fragments.len());
    for (i, rec) in record.fragments.into_iter().enumerate() {
        let slot = rec.shape as usize;
        if slot >= shapes.len() {
            return Err(corrupt(format!(
                "fragment {i} references shape {slot} of {}",
                shapes.len()
            )));
        }
        let instances = rec
            .instances
            .into_iter()
            .map(|r| Instance {
                transform: Mat4::from_cols_array(&r.transform),
                entity: r.entity,
                category: r.category,
            })
            .collect();
        fragments.push((slot, instances));
    }

    Ok(DecodedModel {
        name: record.name,
        origin: Mat4::from_cols_array(&record.origin),
        shapes,
        fragments,
        properties: record.properties,
    })
}

impl DecodedModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Mat4 {
        self.origin
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn fragments(&self) -> &[(usize, Vec<Instance>)] {
        &self.fragments
    }

    pub fn properties(&self) -> Option<&PropertyTable> {
        self.properties.as_ref()
    }

    /// Interns the shapes into `pool` and rebuilds the fragments. On any
    /// failure the provisional shape references are rolled back.
    pub fn instantiate(self, pool: &SharedPool) -> Result<FragmentGroup> {
        let mut reservation = pool.reserve();
        let ids: Vec<ShapeId> = self
            .shapes
            .into_iter()
            .map(|shape| reservation.intern(shape))
            .collect();

        let mut group = FragmentGroup::new(self.name);
        group.set_origin(self.origin)?;
        for (slot, instances) in self.fragments {
            let shape = ids
                .get(slot)
                .copied()
                .ok_or_else(|| corrupt(format!("fragment references shape {slot} of {}", ids.len())))?;
            group.add_fragment(Fragment::create(pool, shape, instances)?)?;
        }
        group.set_properties(self.properties)?;
        reservation.commit();
        Ok(group)
    }
}
