//! Geometry buffer pool: stores every distinct [`Shape`] exactly once and
//! reference-counts it on behalf of the fragments that instance it.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{
    error::{FragmentError, Result},
    shape::{ContentHash, Shape},
};

/// Pool-assigned shape identifier. Never reused while the shape is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u32);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entry {
    shape: Arc<Shape>,
    refs: u32,
}

#[derive(Default)]
pub struct GeometryPool {
    entries: HashMap<ShapeId, Entry>,
    // Several ids per hash only on a genuine hash collision.
    by_hash: HashMap<ContentHash, Vec<ShapeId>>,
    next_id: u32,
}

impl GeometryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of a stored shape with identical content (taking one
    /// more reference on it) or stores `shape` with a single reference.
    pub fn intern(&mut self, shape: Shape) -> ShapeId {
        let candidates = self.by_hash.entry(shape.hash()).or_default();
        for id in candidates.iter() {
            if let Some(entry) = self.entries.get_mut(id) {
                if entry.shape.same_content(&shape) {
                    entry.refs += 1;
                    log::debug!("Shape {} reused ({} refs)", id, entry.refs);
                    return *id;
                }
            }
        }
        if !candidates.is_empty() {
            log::warn!(
                "Content hash collision on {:016x}; storing a separate shape",
                shape.hash()
            );
        }

        let id = ShapeId(self.next_id);
        self.next_id += 1;
        candidates.push(id);
        log::debug!(
            "Shape {} stored: {} vertices, {} indices",
            id,
            shape.vertices().len(),
            shape.indices().len()
        );
        self.entries.insert(
            id,
            Entry {
                shape: Arc::new(shape),
                refs: 1,
            },
        );
        id
    }

    /// Takes one more reference on a live shape.
    pub fn retain(&mut self, id: ShapeId) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(FragmentError::InvalidShape(id))?;
        entry.refs += 1;
        Ok(())
    }

    /// Drops one reference and frees the shape at zero. Unknown ids are
    /// ignored so that disposal can run more than once.
    pub fn release(&mut self, id: ShapeId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return;
        }
        let hash = entry.shape.hash();
        self.entries.remove(&id);
        if let Some(ids) = self.by_hash.get_mut(&hash) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_hash.remove(&hash);
            }
        }
        log::debug!("Shape {} freed", id);
    }

    pub fn get(&self, id: ShapeId) -> Result<Arc<Shape>> {
        self.entries
            .get(&id)
            .map(|entry| Arc::clone(&entry.shape))
            .ok_or(FragmentError::NotFound(id))
    }

    /// Current reference count; zero for unknown ids.
    pub fn refcount(&self, id: ShapeId) -> u32 {
        self.entries.get(&id).map_or(0, |entry| entry.refs)
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of distinct shapes stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes held in vertex and index buffers.
    pub fn buffer_bytes(&self) -> usize {
        self.entries
            .values()
            .map(|e| e.shape.vertex_bytes().len() + e.shape.index_bytes().len())
            .sum()
    }
}

/// Cloneable handle to a pool shared by the manager and every fragment.
///
/// All mutation goes through the mutex, so two interns of identical content
/// racing from different threads still resolve to one id.
#[derive(Clone, Default)]
pub struct SharedPool(Arc<Mutex<GeometryPool>>);

impl SharedPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, shape: Shape) -> ShapeId {
        self.0.lock().intern(shape)
    }

    pub fn retain(&self, id: ShapeId) -> Result<()> {
        self.0.lock().retain(id)
    }

    pub fn release(&self, id: ShapeId) {
        self.0.lock().release(id);
    }

    pub fn get(&self, id: ShapeId) -> Result<Arc<Shape>> {
        self.0.lock().get(id)
    }

    pub fn refcount(&self, id: ShapeId) -> u32 {
        self.0.lock().refcount(id)
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn buffer_bytes(&self) -> usize {
        self.0.lock().buffer_bytes()
    }

    /// Runs `f` with the pool locked. The mutex is not reentrant: `f` must
    /// not drop or dispose a [`Fragment`](crate::fragment::Fragment), nor call
    /// back into this handle.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut GeometryPool) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// Whether both handles point at the same pool.
    pub fn same_pool(&self, other: &SharedPool) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Starts a provisional set of interned shapes for an in-flight load.
    pub fn reserve(&self) -> Reservation {
        Reservation {
            pool: self.clone(),
            ids: Vec::new(),
            committed: false,
        }
    }
}

impl fmt::Debug for SharedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPool")
            .field("shapes", &self.len())
            .finish()
    }
}

/// Provisional references taken while a load builds its fragments.
///
/// Every fragment takes its own reference on creation; the reservation's
/// references are dropped when it goes away. A load that fails, panics or is
/// abandoned therefore leaves no shape behind without an owning fragment.
pub struct Reservation {
    pool: SharedPool,
    ids: Vec<ShapeId>,
    committed: bool,
}

impl Reservation {
    pub fn intern(&mut self, shape: Shape) -> ShapeId {
        let id = self.pool.intern(shape);
        self.ids.push(id);
        id
    }

    pub fn ids(&self) -> &[ShapeId] {
        &self.ids
    }

    /// Marks the load as complete. Shapes not picked up by any fragment are
    /// freed here.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed && !self.ids.is_empty() {
            log::debug!("Rolling back {} provisional shapes", self.ids.len());
        }
        self.pool.with(|pool| {
            for id in self.ids.drain(..) {
                pool.release(id);
            }
        });
    }
}
