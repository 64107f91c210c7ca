//! Fragments manager: the registry of every loaded model in a session.
//!
//! Constructed explicitly and passed around by reference; there is no global
//! instance. Observers registered with
//! [`FragmentsManager::on_fragments_loaded`] run synchronously, in
//! registration order, before `load`/`register` return.

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
};

use corelib::Mat4;

use crate::{
    codec::{self, ExportOptions},
    error::{FragmentError, Result},
    group::{FragmentGroup, GroupId},
    pool::SharedPool,
};

/// Callback fired after a model is registered. An error is logged and does
/// not affect other observers or the load itself.
pub type LoadObserver = Box<dyn FnMut(GroupId, &FragmentGroup) -> anyhow::Result<()>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

pub struct FragmentsManager {
    pool: SharedPool,
    groups: BTreeMap<GroupId, FragmentGroup>,
    observers: Vec<(ObserverId, LoadObserver)>,
    next_group: u32,
    next_observer: u32,
}

impl FragmentsManager {
    pub fn new() -> Self {
        Self::with_pool(SharedPool::new())
    }

    pub fn with_pool(pool: SharedPool) -> Self {
        Self {
            pool,
            groups: BTreeMap::new(),
            observers: Vec::new(),
            next_group: 0,
            next_observer: 0,
        }
    }

    /// The pool every group of this manager interns into.
    pub fn pool(&self) -> &SharedPool {
        &self.pool
    }

    /// Decodes a `.frag` file and registers the resulting model.
    ///
    /// Shapes already present from earlier loads are shared, not duplicated.
    /// On error nothing is registered and the pool is left as it was.
    pub fn load(&mut self, bytes: &[u8]) -> Result<GroupId> {
        let decoded = codec::decode(bytes).inspect_err(|e| {
            log::warn!("Rejected fragment data: {e}");
        })?;
        let shapes_before = self.pool.len();
        let group = decoded.instantiate(&self.pool)?;
        log::info!(
            "Loaded '{}': {} fragments, {} instances, {} new shapes",
            group.name()?,
            group.fragment_count()?,
            group.instance_count()?,
            self.pool.len().saturating_sub(shapes_before)
        );
        self.register(group)
    }

    /// Registers an already-built model under a fresh id and notifies
    /// observers. The group must have been built against [`Self::pool`].
    pub fn register(&mut self, group: FragmentGroup) -> Result<GroupId> {
        if group.is_disposed() {
            return Err(FragmentError::Disposed);
        }
        if !group.uses_pool(&self.pool) {
            return Err(FragmentError::ForeignPool);
        }
        self.prune();
        let id = GroupId(self.next_group);
        self.next_group += 1;
        self.groups.insert(id, group);
        self.notify(id);
        Ok(id)
    }

    fn notify(&mut self, id: GroupId) {
        let Some(group) = self.groups.get(&id) else {
            return;
        };
        for (observer_id, observer) in &mut self.observers {
            match panic::catch_unwind(AssertUnwindSafe(|| observer(id, group))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Load observer {:?} failed for {id}: {e:#}", observer_id),
                Err(_) => log::warn!("Load observer {:?} panicked for {id}", observer_id),
            }
        }
    }

    pub fn on_fragments_loaded<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(GroupId, &FragmentGroup) -> anyhow::Result<()> + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Drops groups that were disposed through [`Self::group_mut`]. Such a
    /// group counts as unregistered from the moment it is disposed.
    fn prune(&mut self) {
        let before = self.groups.len();
        self.groups.retain(|_, g| !g.is_disposed());
        let pruned = before - self.groups.len();
        if pruned > 0 {
            log::debug!("Dropped {pruned} models disposed in place");
        }
    }

    fn live(&self) -> impl Iterator<Item = (&GroupId, &FragmentGroup)> {
        self.groups.iter().filter(|(_, g)| !g.is_disposed())
    }

    pub fn group(&self, id: GroupId) -> Option<&FragmentGroup> {
        self.groups.get(&id).filter(|g| !g.is_disposed())
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut FragmentGroup> {
        self.prune();
        self.groups.get_mut(&id)
    }

    fn require(&self, id: GroupId) -> Result<&FragmentGroup> {
        self.group(id).ok_or(FragmentError::UnknownGroup(id))
    }

    /// Models in load order.
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &FragmentGroup)> {
        self.live().map(|(id, g)| (*id, g))
    }

    pub fn len(&self) -> usize {
        self.live().count()
    }

    pub fn is_empty(&self) -> bool {
        self.live().next().is_none()
    }

    pub fn export(&self, id: GroupId) -> Result<Vec<u8>> {
        self.require(id)?.export()
    }

    pub fn export_with(&self, id: GroupId, options: &ExportOptions) -> Result<Vec<u8>> {
        self.require(id)?.export_with(options)
    }

    /// Property table as JSON text; `None` when the model carries none.
    pub fn export_properties(&self, id: GroupId) -> Result<Option<String>> {
        let Some(properties) = self.require(id)?.get_local_properties()? else {
            return Ok(None);
        };
        properties
            .to_json()
            .map(Some)
            .map_err(|e| FragmentError::Encode(e.to_string()))
    }

    /// Puts every other model into the coordinate system of `base`, so
    /// federated models line up in one shared space.
    ///
    /// Either every model is moved or, on error, none is.
    pub fn coordinate(&mut self, base: GroupId) -> Result<()> {
        self.prune();
        let origin: Mat4 = self.require(base)?.origin()?;
        for (id, group) in &mut self.groups {
            if *id != base {
                group.set_origin(origin)?;
            }
        }
        log::debug!("Coordinated {} models to {base}", self.groups.len());
        Ok(())
    }

    /// Disposes a single model. `false` if it was not registered.
    pub fn remove_group(&mut self, id: GroupId) -> bool {
        match self.groups.remove(&id) {
            Some(mut group) => {
                let live = !group.is_disposed();
                group.dispose();
                live
            }
            None => false,
        }
    }

    /// Disposes every model and clears the registry. The manager stays usable.
    pub fn dispose(&mut self) {
        if self.groups.is_empty() {
            return;
        }
        let count = self.groups.len();
        for (_, mut group) in std::mem::take(&mut self.groups) {
            group.dispose();
        }
        log::info!(
            "Disposed {count} models; {} shapes left in pool",
            self.pool.len()
        );
    }
}

impl Default for FragmentsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fragment::{Fragment, Instance},
        properties::PropertyTable,
        shape::{Shape, cube_at, unit_cube},
    };
    use corelib::vec3;
    use std::{cell::RefCell, rc::Rc};

    fn sample_bytes() -> Vec<u8> {
        let pool = SharedPool::new();
        let cube = pool.intern(Shape::new(unit_cube()).unwrap());
        let mut group = FragmentGroup::new("sample");
        let instances = (0..3)
            .map(|i| Instance::new(Mat4::from_translation(vec3(i as f32 * 2.0, 0.0, 0.0)), i))
            .collect();
        group
            .add_fragment(Fragment::create(&pool, cube, instances).unwrap())
            .unwrap();
        let mut props = PropertyTable::new();
        props.insert(1, "Name", "Beam");
        group.set_properties(Some(props)).unwrap();
        group.export().unwrap()
    }

    #[test]
    fn load_registers_group() {
        let mut manager = FragmentsManager::new();
        let id = manager.load(&sample_bytes()).unwrap();
        assert_eq!(manager.len(), 1);
        let group = manager.group(id).unwrap();
        assert_eq!(group.instance_count().unwrap(), 3);
        assert_eq!(manager.pool().len(), 1);
    }

    #[test]
    fn second_load_reuses_shapes() {
        let mut manager = FragmentsManager::new();
        let bytes = sample_bytes();
        let a = manager.load(&bytes).unwrap();
        let b = manager.load(&bytes).unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.pool().len(), 1);
        let shape = manager.group(a).unwrap().fragments().unwrap().next().unwrap().1.shape_id().unwrap();
        assert_eq!(manager.pool().refcount(shape), 2);
    }

    #[test]
    fn bad_magic_leaves_registry_unchanged() {
        let mut manager = FragmentsManager::new();
        manager.load(&sample_bytes()).unwrap();
        let mut bytes = sample_bytes();
        bytes[..4].copy_from_slice(b"NOPE");
        assert!(matches!(
            manager.load(&bytes),
            Err(FragmentError::CorruptData(_))
        ));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.pool().len(), 1);
    }

    #[test]
    fn round_trip_through_manager() {
        let mut manager = FragmentsManager::new();
        let first = manager.load(&sample_bytes()).unwrap();
        let exported = manager.export(first).unwrap();
        let second = manager.load(&exported).unwrap();
        let (a, b) = (manager.group(first).unwrap(), manager.group(second).unwrap());
        assert_eq!(a.fragment_count().unwrap(), b.fragment_count().unwrap());
        let instances = |g: &FragmentGroup| -> Vec<Instance> {
            g.fragments()
                .unwrap()
                .flat_map(|(_, f)| f.instances().unwrap().to_vec())
                .collect()
        };
        assert_eq!(instances(a), instances(b));
        assert_eq!(
            a.get_local_properties().unwrap(),
            b.get_local_properties().unwrap()
        );
        assert_eq!(exported, manager.export(second).unwrap());
    }

    #[test]
    fn observers_are_isolated() {
        let mut manager = FragmentsManager::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        manager.on_fragments_loaded(|_, _| anyhow::bail!("observer failure"));
        manager.on_fragments_loaded(|_, _| panic!("observer panic"));
        let sink = Rc::clone(&seen);
        manager.on_fragments_loaded(move |id, group| {
            sink.borrow_mut().push((id, group.name()?.to_owned()));
            Ok(())
        });

        let id = manager.load(&sample_bytes()).unwrap();
        assert_eq!(*seen.borrow(), vec![(id, "sample".to_owned())]);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn removed_observer_is_not_called() {
        let mut manager = FragmentsManager::new();
        let calls = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&calls);
        let observer = manager.on_fragments_loaded(move |_, _| {
            *sink.borrow_mut() += 1;
            Ok(())
        });
        manager.load(&sample_bytes()).unwrap();
        assert!(manager.remove_observer(observer));
        assert!(!manager.remove_observer(observer));
        manager.load(&sample_bytes()).unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn dispose_clears_everything_and_is_idempotent() {
        let mut manager = FragmentsManager::new();
        manager.load(&sample_bytes()).unwrap();
        manager.load(&sample_bytes()).unwrap();
        manager.dispose();
        assert!(manager.is_empty());
        assert!(manager.pool().is_empty());
        manager.dispose();
        assert!(manager.is_empty());
        // Still usable afterwards.
        manager.load(&sample_bytes()).unwrap();
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn remove_group_disposes_one_model() {
        let mut manager = FragmentsManager::new();
        let a = manager.load(&sample_bytes()).unwrap();
        let b = manager.load(&sample_bytes()).unwrap();
        assert!(manager.remove_group(a));
        assert!(!manager.remove_group(a));
        assert!(manager.group(b).is_some());
        assert_eq!(manager.pool().len(), 1);
        assert!(matches!(
            manager.export(a),
            Err(FragmentError::UnknownGroup(_))
        ));
    }

    #[test]
    fn coordinate_shares_base_origin() {
        let pool = SharedPool::new();
        let mut manager = FragmentsManager::with_pool(pool.clone());
        let mut base = FragmentGroup::new("base");
        let shape = pool.intern(Shape::new(cube_at(0.0)).unwrap());
        base.add_fragment(Fragment::create(&pool, shape, vec![Instance::new(Mat4::IDENTITY, 1)]).unwrap())
            .unwrap();
        pool.release(shape);
        let shift = Mat4::from_translation(vec3(-100.0, 0.0, 0.0));
        base.set_origin(shift).unwrap();
        let base = manager.register(base).unwrap();
        let other = manager.load(&sample_bytes()).unwrap();

        manager.coordinate(base).unwrap();
        assert_eq!(manager.group(other).unwrap().origin().unwrap(), shift);
        assert!(matches!(
            manager.coordinate(GroupId(99)),
            Err(FragmentError::UnknownGroup(_))
        ));
    }

    #[test]
    fn coordinate_skips_models_disposed_in_place() {
        let mut manager = FragmentsManager::new();
        let base = manager.load(&sample_bytes()).unwrap();
        let b = manager.load(&sample_bytes()).unwrap();
        let c = manager.load(&sample_bytes()).unwrap();
        let shift = Mat4::from_translation(vec3(0.0, 0.0, 50.0));
        manager.group_mut(base).unwrap().set_origin(shift).unwrap();
        manager.group_mut(c).unwrap().dispose();

        assert_eq!(manager.len(), 2);
        assert!(manager.group(c).is_none());
        manager.coordinate(base).unwrap();
        assert_eq!(manager.group(b).unwrap().origin().unwrap(), shift);
        assert!(!manager.remove_group(c));
        assert!(matches!(
            manager.export(c),
            Err(FragmentError::UnknownGroup(_))
        ));
    }

    #[test]
    fn coordinate_to_disposed_base_changes_nothing() {
        let mut manager = FragmentsManager::new();
        let base = manager.load(&sample_bytes()).unwrap();
        let other = manager.load(&sample_bytes()).unwrap();
        manager.group_mut(base).unwrap().dispose();
        assert!(matches!(
            manager.coordinate(base),
            Err(FragmentError::UnknownGroup(_))
        ));
        assert_eq!(manager.group(other).unwrap().origin().unwrap(), Mat4::IDENTITY);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn register_rejects_group_from_another_pool() {
        let mut manager = FragmentsManager::new();
        let foreign = SharedPool::new();
        let shape = foreign.intern(Shape::new(unit_cube()).unwrap());
        let mut group = FragmentGroup::new("foreign");
        group
            .add_fragment(Fragment::create(&foreign, shape, Vec::new()).unwrap())
            .unwrap();
        assert!(matches!(
            manager.register(group),
            Err(FragmentError::ForeignPool)
        ));
        assert!(manager.is_empty());
        assert!(manager.pool().is_empty());
    }

    #[test]
    fn properties_export_as_json() {
        let mut manager = FragmentsManager::new();
        let id = manager.load(&sample_bytes()).unwrap();
        let json = manager.export_properties(id).unwrap().unwrap();
        assert!(json.contains("Beam"));
        manager.group_mut(id).unwrap().set_properties(None).unwrap();
        assert!(manager.export_properties(id).unwrap().is_none());
    }
}
