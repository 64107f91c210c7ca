//! Renderable proxy for an [`Aabb`]: eight corners with line and triangle
//! index lists, ready for a debug-draw or camera-fit pass.

use crate::{Aabb, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxMesh {
    /// Corners in [`Aabb::corners`] order.
    pub vertices: [Vec3; 8],
}

impl BoxMesh {
    #[rustfmt::skip]
    pub const EDGES: [[u32; 2]; 12] = [
        [0, 1], [2, 3], [4, 5], [6, 7],
        [0, 2], [1, 3], [4, 6], [5, 7],
        [0, 4], [1, 5], [2, 6], [3, 7],
    ];

    /// Two counter-clockwise triangles per face, normals pointing outwards.
    #[rustfmt::skip]
    pub const TRIANGLES: [[u32; 3]; 12] = [
        [0, 4, 6], [0, 6, 2], // -x
        [1, 3, 7], [1, 7, 5], // +x
        [0, 1, 5], [0, 5, 4], // -y
        [2, 6, 7], [2, 7, 3], // +y
        [0, 2, 3], [0, 3, 1], // -z
        [4, 5, 7], [4, 7, 6], // +z
    ];

    /// `None` for the empty box.
    pub fn from_aabb(aabb: &Aabb) -> Option<Self> {
        if aabb.is_empty() {
            return None;
        }
        Some(Self {
            vertices: aabb.corners(),
        })
    }

    pub fn positions(&self) -> [[f32; 3]; 8] {
        self.vertices.map(|v| v.to_array())
    }

    pub fn line_indices(&self) -> Vec<u32> {
        Self::EDGES.iter().flatten().copied().collect()
    }

    pub fn triangle_indices(&self) -> Vec<u32> {
        Self::TRIANGLES.iter().flatten().copied().collect()
    }
}
