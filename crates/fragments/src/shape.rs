//! CPU-side geometry: the mesh a parser hands over and the immutable,
//! content-hashed [`Shape`] the pool stores.

use bytemuck::{Pod, Zeroable};
use corelib::Aabb;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{FragmentError, Result};

/// Vertex with position/normal. Values are in shape-local space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct ShapeVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl ShapeVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }
}

/// Indexed triangle mesh with tightly-packed vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<ShapeVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<ShapeVertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
    }
}

pub type ContentHash = u64;

/// Hash over the raw vertex and index bytes. Two meshes with the same
/// buffers always hash the same; the pool still compares content on a hit.
pub fn content_hash(vertices: &[ShapeVertex], indices: &[u32]) -> ContentHash {
    let mut hasher = Xxh3::new();
    hasher.update(&(vertices.len() as u64).to_le_bytes());
    hasher.update(bytemuck::cast_slice(vertices));
    hasher.update(&(indices.len() as u64).to_le_bytes());
    hasher.update(bytemuck::cast_slice(indices));
    hasher.digest()
}

/// Immutable geometry payload. Built once per distinct mesh and shared by
/// every fragment that instances it.
#[derive(Debug, PartialEq)]
pub struct Shape {
    mesh: MeshData,
    hash: ContentHash,
    bounds: Aabb,
}

impl Shape {
    /// Validates that `mesh` is a non-empty triangle list whose indices all
    /// address existing vertices.
    pub fn new(mesh: MeshData) -> Result<Self> {
        if !mesh.is_valid() {
            return Err(FragmentError::InvalidGeometry(
                "shape has no vertices or no indices".into(),
            ));
        }
        if mesh.indices.len() % 3 != 0 {
            return Err(FragmentError::InvalidGeometry(format!(
                "index count {} is not a multiple of 3",
                mesh.indices.len()
            )));
        }
        let vertex_count = mesh.vertices.len();
        if let Some(bad) = mesh.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(FragmentError::InvalidGeometry(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }

        let hash = content_hash(&mesh.vertices, &mesh.indices);
        let bounds = mesh.bounds();
        Ok(Self { mesh, hash, bounds })
    }

    #[inline]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    #[inline]
    pub fn local_bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn vertices(&self) -> &[ShapeVertex] {
        &self.mesh.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.mesh.indices
    }

    pub fn mesh(&self) -> &MeshData {
        &self.mesh
    }

    /// Vertex buffer as uploaded to the GPU.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.mesh.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.mesh.indices)
    }

    pub fn same_content(&self, other: &Shape) -> bool {
        self.hash == other.hash && self.mesh == other.mesh
    }
}

/// Axis-aligned unit cube centered at the origin: 8 vertices, 12 triangles.
#[cfg(test)]
pub(crate) fn unit_cube() -> MeshData {
    let vertices = corelib::Aabb::new([-0.5; 3], [0.5; 3])
        .corners()
        .map(|c| ShapeVertex::new(c.to_array(), c.normalize().to_array()))
        .to_vec();
    let indices = corelib::BoxMesh::TRIANGLES.iter().flatten().copied().collect();
    MeshData::new(vertices, indices)
}

/// Unit cube spanning `[min, min + 1]` on every axis.
#[cfg(test)]
pub(crate) fn cube_at(min: f32) -> MeshData {
    let mut mesh = unit_cube();
    for v in &mut mesh.vertices {
        v.position = v.position.map(|c| c + 0.5 + min);
    }
    mesh
}
