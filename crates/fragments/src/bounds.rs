//! Incremental bounding box over any mix of fragments, models and meshes.

use corelib::{Aabb, BoxMesh, Mat4, Vec3};

use crate::{
    error::{FragmentError, Result},
    fragment::Fragment,
    group::FragmentGroup,
    shape::MeshData,
};

/// Anything that can report its world-space box. `Ok(None)` means "no
/// geometry" and leaves an accumulation untouched.
pub trait WorldBounds {
    fn world_bounds(&self) -> Result<Option<Aabb>>;
}

impl WorldBounds for Fragment {
    fn world_bounds(&self) -> Result<Option<Aabb>> {
        self.compute_world_aabb()
    }
}

impl WorldBounds for FragmentGroup {
    fn world_bounds(&self) -> Result<Option<Aabb>> {
        self.compute_world_aabb()
    }
}

impl WorldBounds for Aabb {
    fn world_bounds(&self) -> Result<Option<Aabb>> {
        Ok((!self.is_empty()).then_some(*self))
    }
}

/// A mesh whose vertices are already in world space.
impl WorldBounds for MeshData {
    fn world_bounds(&self) -> Result<Option<Aabb>> {
        self.bounds().world_bounds()
    }
}

/// A raw mesh placed in the world by `transform`.
#[derive(Clone, Copy, Debug)]
pub struct PlacedMesh<'a> {
    pub mesh: &'a MeshData,
    pub transform: Mat4,
}

impl WorldBounds for PlacedMesh<'_> {
    fn world_bounds(&self) -> Result<Option<Aabb>> {
        let aabb = Aabb::from_points(
            self.mesh
                .vertices
                .iter()
                .map(|v| self.transform.transform_point3(Vec3::from(v.position))),
        );
        aabb.world_bounds()
    }
}

/// Running union of every source added since the last [`reset`].
///
/// `add` only ever grows the box. Reusing one accumulator for two unrelated
/// computations without calling [`reset`] in between yields the union of
/// both; that is the caller's responsibility. [`BoundingBoxer::compute`]
/// sidesteps it by using a fresh accumulator per call.
///
/// Only scalars are stored, so sources may be disposed after being added.
///
/// [`reset`]: BoundingBoxer::reset
#[derive(Clone, Copy, Debug, Default)]
pub struct BoundingBoxer {
    extent: Option<Aabb>,
}

impl BoundingBoxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the world box of `source` into the extent. A disposed source
    /// fails with [`FragmentError::Disposed`] and leaves the extent as is.
    pub fn add<S: WorldBounds + ?Sized>(&mut self, source: &S) -> Result<()> {
        if let Some(aabb) = source.world_bounds()? {
            self.extent = Some(match self.extent {
                Some(extent) => extent.union(aabb),
                None => aabb,
            });
        }
        Ok(())
    }

    /// Current extent, or [`Aabb::EMPTY`] when nothing has been added.
    pub fn get_box(&self) -> Aabb {
        self.extent.unwrap_or(Aabb::EMPTY)
    }

    pub fn try_box(&self) -> Result<Aabb> {
        self.extent.ok_or(FragmentError::Empty)
    }

    /// Renderable proxy of the current extent; `None` while empty.
    pub fn get_mesh(&self) -> Option<BoxMesh> {
        self.extent.as_ref().and_then(BoxMesh::from_aabb)
    }

    pub fn center(&self) -> Option<Vec3> {
        self.extent.map(|b| b.center())
    }

    pub fn size(&self) -> Option<Vec3> {
        self.extent.map(|b| b.size())
    }

    pub fn is_empty(&self) -> bool {
        self.extent.is_none()
    }

    pub fn reset(&mut self) {
        self.extent = None;
    }

    /// One-shot union of `sources` with its own accumulator.
    pub fn compute<'a, I, S>(sources: I) -> Result<Aabb>
    where
        I: IntoIterator<Item = &'a S>,
        S: WorldBounds + ?Sized + 'a,
    {
        let mut boxer = Self::new();
        for source in sources {
            boxer.add(source)?;
        }
        Ok(boxer.get_box())
    }
}
