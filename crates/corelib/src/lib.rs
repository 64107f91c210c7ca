//! Core math types shared by the fragment store: glam re-exports, AABB,
//! and the renderable box proxy.

pub use glam::{Mat4, Quat, Vec3, vec3};

pub mod aabb;
pub mod box_mesh;

pub use aabb::Aabb;
pub use box_mesh::BoxMesh;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_mesh_follows_aabb() {
        let aabb = Aabb::new(vec3(-1.0, 0.0, 2.0), vec3(1.0, 3.0, 4.0));
        let mesh = BoxMesh::from_aabb(&aabb).expect("non-empty box");
        let rebuilt = Aabb::from_points(mesh.vertices);
        assert_eq!(rebuilt, aabb);
    }

    #[test]
    fn empty_aabb_has_no_mesh() {
        assert!(BoxMesh::from_aabb(&Aabb::EMPTY).is_none());
    }
}
