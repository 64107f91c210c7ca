//! Fragment group: everything one loaded model consists of.

use std::fmt;

use corelib::{Aabb, Mat4};

use crate::{
    codec::{self, ExportOptions},
    error::{FragmentError, Result},
    fragment::Fragment,
    pool::SharedPool,
    properties::PropertyTable,
};

/// Manager-assigned model identifier, increasing in load order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub(crate) u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model-{}", self.0)
    }
}

/// Group-assigned fragment identifier; never reused within a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(u32);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frag-{}", self.0)
    }
}

#[derive(Debug)]
pub struct FragmentGroup {
    name: String,
    /// Applied on top of every instance transform when placing the model in
    /// the shared world.
    origin: Mat4,
    fragments: Vec<(FragmentId, Fragment)>,
    properties: Option<PropertyTable>,
    next_fragment: u32,
    disposed: bool,
}

impl FragmentGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: Mat4::IDENTITY,
            fragments: Vec::new(),
            properties: None,
            next_fragment: 0,
            disposed: false,
        }
    }

    #[inline]
    fn check(&self) -> Result<()> {
        if self.disposed {
            Err(FragmentError::Disposed)
        } else {
            Ok(())
        }
    }

    pub fn name(&self) -> Result<&str> {
        self.check()?;
        Ok(&self.name)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn origin(&self) -> Result<Mat4> {
        self.check()?;
        Ok(self.origin)
    }

    pub fn set_origin(&mut self, origin: Mat4) -> Result<()> {
        self.check()?;
        self.origin = origin;
        Ok(())
    }

    /// Fragments disposed through [`FragmentGroup::fragment_mut`] count as
    /// removed: lookups skip them and the next mutation drops them.
    fn live(&self) -> impl Iterator<Item = &(FragmentId, Fragment)> {
        self.fragments.iter().filter(|(_, f)| !f.is_disposed())
    }

    fn prune(&mut self) {
        self.fragments.retain(|(_, f)| !f.is_disposed());
    }

    pub fn add_fragment(&mut self, fragment: Fragment) -> Result<FragmentId> {
        self.check()?;
        self.prune();
        if fragment.is_disposed() {
            return Err(FragmentError::Disposed);
        }
        let id = FragmentId(self.next_fragment);
        self.next_fragment += 1;
        self.fragments.push((id, fragment));
        Ok(id)
    }

    /// Disposes and drops the fragment. `false` if no such fragment.
    pub fn remove_fragment(&mut self, id: FragmentId) -> Result<bool> {
        self.check()?;
        self.prune();
        let Some(pos) = self.fragments.iter().position(|(fid, _)| *fid == id) else {
            return Ok(false);
        };
        let (_, mut fragment) = self.fragments.remove(pos);
        fragment.dispose();
        Ok(true)
    }

    pub fn fragment(&self, id: FragmentId) -> Result<Option<&Fragment>> {
        self.check()?;
        Ok(self.live().find(|(fid, _)| *fid == id).map(|(_, f)| f))
    }

    pub fn fragment_mut(&mut self, id: FragmentId) -> Result<Option<&mut Fragment>> {
        self.check()?;
        Ok(self
            .fragments
            .iter_mut()
            .find(|(fid, f)| *fid == id && !f.is_disposed())
            .map(|(_, f)| f))
    }

    /// Fragments in insertion order.
    pub fn fragments(&self) -> Result<impl Iterator<Item = (FragmentId, &Fragment)>> {
        self.check()?;
        Ok(self.live().map(|(id, f)| (*id, f)))
    }

    pub fn fragment_count(&self) -> Result<usize> {
        self.check()?;
        Ok(self.live().count())
    }

    pub fn instance_count(&self) -> Result<usize> {
        self.check()?;
        self.live().map(|(_, f)| f.instance_count()).sum()
    }

    /// Whether every fragment was created against `pool`.
    pub(crate) fn uses_pool(&self, pool: &SharedPool) -> bool {
        self.live().all(|(_, f)| f.pool().same_pool(pool))
    }

    /// Metadata attached during load. `None` is a normal state: not every
    /// load carries properties.
    pub fn get_local_properties(&self) -> Result<Option<&PropertyTable>> {
        self.check()?;
        Ok(self.properties.as_ref())
    }

    pub fn set_properties(&mut self, properties: Option<PropertyTable>) -> Result<()> {
        self.check()?;
        self.properties = properties;
        Ok(())
    }

    /// Union of all fragment boxes in world space (origin applied).
    pub fn compute_world_aabb(&self) -> Result<Option<Aabb>> {
        self.check()?;
        let mut aabb = Aabb::EMPTY;
        for (_, fragment) in self.live() {
            if let Some(b) = fragment.compute_world_aabb_with(self.origin)? {
                aabb = aabb.union(b);
            }
        }
        Ok((!aabb.is_empty()).then_some(aabb))
    }

    /// Serializes the group into the `.frag` format with default options.
    pub fn export(&self) -> Result<Vec<u8>> {
        self.export_with(&ExportOptions::default())
    }

    pub fn export_with(&self, options: &ExportOptions) -> Result<Vec<u8>> {
        self.check()?;
        codec::encode(self, options)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Disposes every fragment. Calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        for (_, fragment) in &mut self.fragments {
            fragment.dispose();
        }
        self.fragments.clear();
        self.properties = None;
        log::debug!("Disposed group '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fragment::Instance,
        pool::SharedPool,
        shape::{Shape, cube_at, unit_cube},
    };
    use corelib::vec3;

    fn two_fragment_group(pool: &SharedPool) -> (FragmentGroup, FragmentId, FragmentId) {
        let a = pool.intern(Shape::new(cube_at(0.0)).unwrap());
        let b = pool.intern(Shape::new(unit_cube()).unwrap());
        let mut group = FragmentGroup::new("house");
        let fa = group
            .add_fragment(Fragment::create(pool, a, vec![Instance::new(Mat4::IDENTITY, 1)]).unwrap())
            .unwrap();
        let t = Mat4::from_translation(vec3(2.5, 2.5, 2.5));
        let fb = group
            .add_fragment(Fragment::create(pool, b, vec![Instance::new(t, 2)]).unwrap())
            .unwrap();
        pool.release(a);
        pool.release(b);
        (group, fa, fb)
    }

    #[test]
    fn world_box_covers_all_fragments() {
        let pool = SharedPool::new();
        let (group, _, _) = two_fragment_group(&pool);
        let aabb = group.compute_world_aabb().unwrap().unwrap();
        assert_eq!(aabb, Aabb::new(vec3(0.0, 0.0, 0.0), vec3(3.0, 3.0, 3.0)));
    }

    #[test]
    fn origin_moves_world_box() {
        let pool = SharedPool::new();
        let (mut group, _, _) = two_fragment_group(&pool);
        group
            .set_origin(Mat4::from_translation(vec3(-1.5, -1.5, -1.5)))
            .unwrap();
        let aabb = group.compute_world_aabb().unwrap().unwrap();
        assert_eq!(aabb.center(), vec3(0.0, 0.0, 0.0));
    }

    #[test]
    fn remove_fragment_disposes_it() {
        let pool = SharedPool::new();
        let (mut group, fa, _) = two_fragment_group(&pool);
        assert_eq!(pool.len(), 2);
        assert!(group.remove_fragment(fa).unwrap());
        assert!(!group.remove_fragment(fa).unwrap());
        assert_eq!(pool.len(), 1);
        assert_eq!(group.fragment_count().unwrap(), 1);
        assert!(group.fragment(fa).unwrap().is_none());
    }

    #[test]
    fn fragment_disposed_in_place_counts_as_removed() {
        let pool = SharedPool::new();
        let (mut group, fa, fb) = two_fragment_group(&pool);
        group.fragment_mut(fb).unwrap().unwrap().dispose();
        assert_eq!(group.fragment_count().unwrap(), 1);
        assert_eq!(group.instance_count().unwrap(), 1);
        assert!(group.fragment(fb).unwrap().is_none());
        assert!(group.fragment_mut(fb).unwrap().is_none());
        let ids: Vec<_> = group.fragments().unwrap().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![fa]);
        assert_eq!(
            group.compute_world_aabb().unwrap().unwrap(),
            Aabb::new(vec3(0.0, 0.0, 0.0), vec3(1.0, 1.0, 1.0))
        );
        assert!(!group.remove_fragment(fb).unwrap());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn fragment_ids_are_not_reused() {
        let pool = SharedPool::new();
        let (mut group, fa, fb) = two_fragment_group(&pool);
        group.remove_fragment(fb).unwrap();
        let shape = pool.intern(Shape::new(unit_cube()).unwrap());
        let fc = group
            .add_fragment(Fragment::create(&pool, shape, Vec::new()).unwrap())
            .unwrap();
        assert_ne!(fc, fa);
        assert_ne!(fc, fb);
    }

    #[test]
    fn properties_are_optional() {
        let pool = SharedPool::new();
        let (mut group, _, _) = two_fragment_group(&pool);
        assert!(group.get_local_properties().unwrap().is_none());
        let mut props = PropertyTable::new();
        props.insert(1, "Name", "Slab");
        group.set_properties(Some(props.clone())).unwrap();
        assert_eq!(group.get_local_properties().unwrap(), Some(&props));
    }

    #[test]
    fn dispose_twice_is_a_noop() {
        let pool = SharedPool::new();
        let (mut group, fa, _) = two_fragment_group(&pool);
        group.dispose();
        group.dispose();
        assert!(pool.is_empty());
        assert!(group.is_disposed());
        assert!(matches!(group.fragment(fa), Err(FragmentError::Disposed)));
        assert!(matches!(group.export(), Err(FragmentError::Disposed)));
        assert!(matches!(
            group.get_local_properties(),
            Err(FragmentError::Disposed)
        ));
        assert!(matches!(group.name(), Err(FragmentError::Disposed)));
        assert!(matches!(group.origin(), Err(FragmentError::Disposed)));
        assert!(matches!(group.fragment_count(), Err(FragmentError::Disposed)));
        assert!(matches!(group.instance_count(), Err(FragmentError::Disposed)));
    }
}
