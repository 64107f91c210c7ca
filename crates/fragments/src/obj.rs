//! Minimal OBJ reader producing raw entities for the [`Converter`].
//!
//! `o NAME` starts a new entity. `g CODE` with a numeric code sets the
//! category for the current entity (if it has no faces yet) and every entity
//! after it. Each entity's vertices are moved so their box is centred on the
//! origin and the offset becomes the placement, which lets equal objects at
//! different positions share one shape.
//!
//! [`Converter`]: crate::convert::Converter

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use corelib::{Aabb, Mat4, Vec3};

use crate::{
    convert::{RawEntity, RawPlacement},
    fragment::{CategoryId, EntityId},
    properties::PropertyTable,
    shape::{MeshData, ShapeVertex},
};

/// Entities and their properties (`Name`, `VertexCount`, `TriangleCount`).
#[derive(Clone, Debug)]
pub struct ObjModel {
    pub entities: Vec<RawEntity>,
    pub properties: PropertyTable,
}

pub fn load_obj_from_path(path: impl AsRef<Path>) -> Result<ObjModel> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.as_ref().display()))?;
    load_obj_from_reader(BufReader::new(file))
}

pub fn load_obj_from_reader<R: BufRead>(reader: R) -> Result<ObjModel> {
    parse_obj(reader)
}

pub fn load_obj_from_str(contents: &str) -> Result<ObjModel> {
    parse_obj(io::Cursor::new(contents))
}

/// Entity under construction. Indices refer to `vertices`, which only holds
/// the corners this entity actually uses.
struct Pending {
    name: String,
    category: Option<CategoryId>,
    unique: HashMap<Corner, u32>,
    vertices: Vec<ShapeVertex>,
    indices: Vec<u32>,
}

impl Pending {
    fn new(name: String, category: Option<CategoryId>) -> Self {
        Self {
            name,
            category,
            unique: HashMap::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Builder {
    entities: Vec<RawEntity>,
    properties: PropertyTable,
}

impl Builder {
    fn finish(&mut self, pending: Pending) {
        if pending.indices.is_empty() {
            if !pending.vertices.is_empty() || !pending.name.is_empty() {
                log::debug!("OBJ object '{}' has no faces, skipped", pending.name);
            }
            return;
        }

        let center = Aabb::from_points(pending.vertices.iter().map(|v| v.position)).center();
        let vertices = pending
            .vertices
            .into_iter()
            .map(|v| ShapeVertex::new((Vec3::from(v.position) - center).to_array(), v.normal))
            .collect::<Vec<_>>();

        let id = self.entities.len() as EntityId + 1;
        let name = if pending.name.is_empty() {
            format!("object-{id}")
        } else {
            pending.name
        };
        self.properties.insert(id, "Name", name);
        self.properties
            .insert(id, "VertexCount", vertices.len() as i64);
        self.properties
            .insert(id, "TriangleCount", (pending.indices.len() / 3) as i64);

        self.entities.push(RawEntity {
            id,
            category: pending.category,
            placements: vec![RawPlacement {
                mesh: MeshData::new(vertices, pending.indices),
                transform: Mat4::from_translation(center),
            }],
        });
    }
}

fn parse_obj<R: BufRead>(reader: R) -> Result<ObjModel> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut counts = Counts::default();

    let mut category: Option<CategoryId> = None;
    let mut current = Pending::new(String::new(), None);
    let mut builder = Builder::default();
    let mut ignored: HashSet<String> = HashSet::new();

    for (idx, text) in reader.lines().enumerate() {
        let line = idx + 1;
        let text = text.with_context(|| format!("Failed to read line {line}"))?;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };

        match tag {
            "v" => {
                positions.push(parse_vec3(parts, line, "vertex")?);
                counts.positions = positions.len();
            }
            "vt" => counts.texcoords += 1,
            "vn" => {
                normals.push(parse_vec3(parts, line, "normal")?);
                counts.normals = normals.len();
            }
            "o" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                let previous = std::mem::replace(&mut current, Pending::new(name, category));
                builder.finish(previous);
            }
            "g" => {
                let code = parts.next();
                category = code.and_then(|c| c.parse::<CategoryId>().ok());
                if category.is_none() {
                    log::debug!(
                        "Non-numeric group '{}' on line {line} clears the category",
                        code.unwrap_or_default()
                    );
                }
                if current.indices.is_empty() {
                    current.category = category;
                }
            }
            "f" => {
                let mut face: Vec<u32> = Vec::new();
                for token in parts {
                    let corner = parse_corner(token, counts, line)?;
                    let index = match current.unique.get(&corner) {
                        Some(&index) => index,
                        None => {
                            let normal = corner
                                .normal
                                .map_or([0.0, 0.0, 1.0], |n| normals[n]);
                            let index = u32::try_from(current.vertices.len()).map_err(|_| {
                                anyhow!("Too many vertices in OBJ object (>{})", u32::MAX)
                            })?;
                            current
                                .vertices
                                .push(ShapeVertex::new(positions[corner.position], normal));
                            current.unique.insert(corner, index);
                            index
                        }
                    };
                    face.push(index);
                }

                if face.len() < 3 {
                    log::warn!("Degenerate face on line {line} skipped");
                    continue;
                }
                // Triangulate fan
                for pair in face[1..].windows(2) {
                    current
                        .indices
                        .extend_from_slice(&[face[0], pair[0], pair[1]]);
                }
            }
            other => {
                if ignored.insert(other.to_owned()) {
                    log::warn!("Ignoring OBJ directive '{other}' (line {line})");
                }
            }
        }
    }
    builder.finish(current);

    if builder.entities.is_empty() {
        anyhow::bail!("OBJ contained no triangles");
    }

    log::debug!(
        "Parsed OBJ: {} entities from {} positions",
        builder.entities.len(),
        positions.len()
    );
    Ok(ObjModel {
        entities: builder.entities,
        properties: builder.properties,
    })
}

/// One face corner. Texture indices are range-checked and then dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Corner {
    position: usize,
    normal: Option<usize>,
}

/// Element counts seen so far; face indices resolve against them.
#[derive(Clone, Copy, Debug, Default)]
struct Counts {
    positions: usize,
    texcoords: usize,
    normals: usize,
}

fn parse_vec3<'a>(
    mut parts: impl Iterator<Item = &'a str>,
    line: usize,
    what: &str,
) -> Result<[f32; 3]> {
    let mut out = [0.0; 3];
    for (axis, slot) in ["x", "y", "z"].into_iter().zip(&mut out) {
        let token = parts
            .next()
            .ok_or_else(|| anyhow!("{what} on line {line} is missing {axis}"))?;
        *slot = token
            .parse()
            .with_context(|| format!("Bad {what} {axis} '{token}' on line {line}"))?;
    }
    Ok(out)
}

fn parse_corner(token: &str, counts: Counts, line: usize) -> Result<Corner> {
    let field = |value: Option<&str>, len: usize| -> Result<Option<usize>> {
        match value {
            Some(v) if !v.is_empty() => resolve_index(v, len, line).map(Some),
            _ => Ok(None),
        }
    };
    let mut fields = token.split('/');
    let position = field(fields.next(), counts.positions)?
        .ok_or_else(|| anyhow!("Face corner '{token}' has no position on line {line}"))?;
    field(fields.next(), counts.texcoords)?;
    let normal = field(fields.next(), counts.normals)?;
    Ok(Corner { position, normal })
}

/// Resolves a 1-based or negative (relative) OBJ index into `0..len`.
fn resolve_index(token: &str, len: usize, line: usize) -> Result<usize> {
    let raw: i64 = token
        .parse()
        .with_context(|| format!("Invalid index '{token}' on line {line}"))?;
    let resolved = match raw {
        0 => anyhow::bail!("OBJ indices start at 1; found 0 on line {line}"),
        1.. => raw - 1,
        _ => len as i64 + raw,
    };
    usize::try_from(resolved)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| anyhow!("Index {raw} out of range for {len} elements on line {line}"))
}
