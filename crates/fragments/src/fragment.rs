//! Fragment: one pooled shape plus the instances that place it in the model.

use std::sync::Arc;

use corelib::{Aabb, Mat4};

use crate::{
    error::{FragmentError, Result},
    pool::{ShapeId, SharedPool},
    shape::Shape,
};

/// Entity id from the source model (an IFC express id).
pub type EntityId = u32;

/// Source category code (an IFC type constant).
pub type CategoryId = u32;

/// One placement of a fragment's shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub transform: Mat4,
    pub entity: EntityId,
    pub category: Option<CategoryId>,
}

impl Instance {
    pub fn new(transform: Mat4, entity: EntityId) -> Self {
        Self {
            transform,
            entity,
            category: None,
        }
    }

    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }
}

/// Disposable handle over one shape in the pool.
///
/// Holds one pool reference for its whole life. [`Fragment::dispose`] (or
/// dropping the fragment) gives it back; afterwards every operation fails
/// with [`FragmentError::Disposed`].
#[derive(Debug)]
pub struct Fragment {
    pool: SharedPool,
    shape: ShapeId,
    local_bounds: Aabb,
    instances: Vec<Instance>,
    disposed: bool,
}

impl Fragment {
    pub fn create(pool: &SharedPool, shape: ShapeId, instances: Vec<Instance>) -> Result<Self> {
        let local_bounds = pool.with(|p| {
            p.retain(shape)?;
            p.get(shape).map(|s| s.local_bounds())
        })?;
        Ok(Self {
            pool: pool.clone(),
            shape,
            local_bounds,
            instances,
            disposed: false,
        })
    }

    #[inline]
    fn check(&self) -> Result<()> {
        if self.disposed {
            Err(FragmentError::Disposed)
        } else {
            Ok(())
        }
    }

    pub fn shape_id(&self) -> Result<ShapeId> {
        self.check()?;
        Ok(self.shape)
    }

    pub(crate) fn pool(&self) -> &SharedPool {
        &self.pool
    }

    pub fn shape(&self) -> Result<Arc<Shape>> {
        self.check()?;
        self.pool.get(self.shape)
    }

    pub fn local_bounds(&self) -> Result<Aabb> {
        self.check()?;
        Ok(self.local_bounds)
    }

    pub fn instances(&self) -> Result<&[Instance]> {
        self.check()?;
        Ok(&self.instances)
    }

    pub fn instance_count(&self) -> Result<usize> {
        self.check()?;
        Ok(self.instances.len())
    }

    pub fn contains_entity(&self, entity: EntityId) -> Result<bool> {
        self.check()?;
        Ok(self.instances.iter().any(|i| i.entity == entity))
    }

    pub fn add_instance(&mut self, transform: Mat4, entity: EntityId) -> Result<()> {
        self.push_instance(Instance::new(transform, entity))
    }

    pub fn push_instance(&mut self, instance: Instance) -> Result<()> {
        self.check()?;
        self.instances.push(instance);
        Ok(())
    }

    /// Removes every instance of `entity`, returning how many went away.
    pub fn remove_instance(&mut self, entity: EntityId) -> Result<usize> {
        self.check()?;
        let before = self.instances.len();
        self.instances.retain(|i| i.entity != entity);
        Ok(before - self.instances.len())
    }

    /// Moves every instance of `entity`; used to explode or restore a model.
    pub fn set_instance_transform(&mut self, entity: EntityId, transform: Mat4) -> Result<usize> {
        self.check()?;
        let mut moved = 0;
        for instance in self.instances.iter_mut().filter(|i| i.entity == entity) {
            instance.transform = transform;
            moved += 1;
        }
        Ok(moved)
    }

    /// World box of all instances. `None` when there are no instances.
    pub fn compute_world_aabb(&self) -> Result<Option<Aabb>> {
        self.compute_world_aabb_with(Mat4::IDENTITY)
    }

    /// Same as [`Fragment::compute_world_aabb`] with `origin` applied on top
    /// of every instance transform.
    pub fn compute_world_aabb_with(&self, origin: Mat4) -> Result<Option<Aabb>> {
        self.check()?;
        let aabb = self
            .instances
            .iter()
            .map(|i| self.local_bounds.transform(origin * i.transform))
            .fold(Aabb::EMPTY, Aabb::union);
        Ok((!aabb.is_empty()).then_some(aabb))
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.instances.clear();
        self.pool.release(self.shape);
    }
}

impl Drop for Fragment {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::unit_cube;
    use corelib::{Vec3, vec3};

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    fn pool_with_cube() -> (SharedPool, ShapeId) {
        let pool = SharedPool::new();
        let id = pool.intern(Shape::new(unit_cube()).unwrap());
        (pool, id)
    }

    #[test]
    fn translated_cube_world_box() {
        let (pool, cube) = pool_with_cube();
        let t = Mat4::from_translation(vec3(10.0, 0.0, 0.0));
        let fragment = Fragment::create(&pool, cube, vec![Instance::new(t, 1)]).unwrap();
        let aabb = fragment.compute_world_aabb().unwrap().expect("one instance");
        assert!(approx(aabb.min, vec3(9.5, -0.5, -0.5)));
        assert!(approx(aabb.max, vec3(10.5, 0.5, 0.5)));
    }

    #[test]
    fn no_instances_no_box() {
        let (pool, cube) = pool_with_cube();
        let fragment = Fragment::create(&pool, cube, Vec::new()).unwrap();
        assert_eq!(fragment.compute_world_aabb().unwrap(), None);
    }

    #[test]
    fn create_takes_a_reference() {
        let (pool, cube) = pool_with_cube();
        let a = Fragment::create(&pool, cube, Vec::new()).unwrap();
        let b = Fragment::create(&pool, cube, Vec::new()).unwrap();
        assert_eq!(pool.refcount(cube), 3);
        drop(a);
        drop(b);
        assert_eq!(pool.refcount(cube), 1);
    }

    #[test]
    fn create_with_unknown_shape_fails() {
        let (pool, cube) = pool_with_cube();
        pool.release(cube);
        assert!(matches!(
            Fragment::create(&pool, cube, Vec::new()),
            Err(FragmentError::InvalidShape(_))
        ));
    }

    #[test]
    fn instances_add_remove_move() {
        let (pool, cube) = pool_with_cube();
        let mut fragment = Fragment::create(&pool, cube, Vec::new()).unwrap();
        fragment.add_instance(Mat4::IDENTITY, 7).unwrap();
        fragment
            .push_instance(Instance::new(Mat4::IDENTITY, 8).with_category(42))
            .unwrap();
        fragment.add_instance(Mat4::IDENTITY, 7).unwrap();
        assert_eq!(fragment.instance_count().unwrap(), 3);
        assert!(fragment.contains_entity(8).unwrap());

        let up = Mat4::from_translation(vec3(0.0, 5.0, 0.0));
        assert_eq!(fragment.set_instance_transform(8, up).unwrap(), 1);
        let aabb = fragment.compute_world_aabb().unwrap().unwrap();
        assert!(approx(aabb.max, vec3(0.5, 5.5, 0.5)));

        assert_eq!(fragment.remove_instance(7).unwrap(), 2);
        assert_eq!(fragment.remove_instance(99).unwrap(), 0);
        assert_eq!(fragment.instances().unwrap()[0].category, Some(42));
    }

    #[test]
    fn dispose_is_idempotent() {
        let (pool, cube) = pool_with_cube();
        let mut fragment = Fragment::create(&pool, cube, vec![Instance::new(Mat4::IDENTITY, 1)]).unwrap();
        pool.release(cube);
        fragment.dispose();
        fragment.dispose();
        assert!(pool.is_empty());
        assert!(matches!(fragment.instances(), Err(FragmentError::Disposed)));
        assert!(matches!(
            fragment.add_instance(Mat4::IDENTITY, 2),
            Err(FragmentError::Disposed)
        ));
        assert!(matches!(
            fragment.compute_world_aabb(),
            Err(FragmentError::Disposed)
        ));
        assert!(matches!(
            fragment.instance_count(),
            Err(FragmentError::Disposed)
        ));
        assert!(matches!(
            fragment.contains_entity(1),
            Err(FragmentError::Disposed)
        ));
        assert!(matches!(fragment.shape_id(), Err(FragmentError::Disposed)));
    }
}
