//! Turns raw entity records from an external parser into a fragment group.

use std::collections::{HashMap, HashSet};

use corelib::Mat4;

use crate::{
    error::Result,
    fragment::{CategoryId, EntityId, Fragment, Instance},
    group::FragmentGroup,
    pool::{SharedPool, ShapeId},
    properties::PropertyTable,
    shape::{MeshData, Shape},
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversionSettings {
    /// Entities in these categories are skipped before any geometry is
    /// interned.
    pub excluded_categories: HashSet<CategoryId>,
    /// Move the model so its world box is centred on the origin.
    pub coordinate_to_origin: bool,
}

impl ConversionSettings {
    pub fn excluding(mut self, categories: impl IntoIterator<Item = CategoryId>) -> Self {
        self.excluded_categories.extend(categories);
        self
    }

    pub fn with_coordinate_to_origin(mut self, on: bool) -> Self {
        self.coordinate_to_origin = on;
        self
    }

    fn is_excluded(&self, category: Option<CategoryId>) -> bool {
        category.is_some_and(|c| self.excluded_categories.contains(&c))
    }
}

/// One occurrence of a mesh in world space.
#[derive(Clone, Debug)]
pub struct RawPlacement {
    pub mesh: MeshData,
    pub transform: Mat4,
}

#[derive(Clone, Debug)]
pub struct RawEntity {
    pub id: EntityId,
    pub category: Option<CategoryId>,
    pub placements: Vec<RawPlacement>,
}

#[derive(Clone, Debug, Default)]
pub struct Converter {
    settings: ConversionSettings,
}

impl Converter {
    pub fn new(settings: ConversionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    /// Builds a group with one fragment per distinct shape, in the order the
    /// shapes are first seen. Placements with unusable meshes are skipped.
    pub fn convert(
        &self,
        pool: &SharedPool,
        name: &str,
        entities: impl IntoIterator<Item = RawEntity>,
        properties: Option<PropertyTable>,
    ) -> Result<FragmentGroup> {
        let mut reservation = pool.reserve();
        let mut batches: Vec<(ShapeId, Vec<Instance>)> = Vec::new();
        let mut slot_of: HashMap<ShapeId, usize> = HashMap::new();
        let mut excluded: HashSet<EntityId> = HashSet::new();
        let mut skipped = 0usize;

        for entity in entities {
            if self.settings.is_excluded(entity.category) {
                excluded.insert(entity.id);
                continue;
            }
            for placement in entity.placements {
                let shape = match Shape::new(placement.mesh) {
                    Ok(shape) => shape,
                    Err(e) => {
                        log::warn!("Skipping placement of entity {}: {e}", entity.id);
                        skipped += 1;
                        continue;
                    }
                };
                let id = reservation.intern(shape);
                let mut instance = Instance::new(placement.transform, entity.id);
                if let Some(category) = entity.category {
                    instance = instance.with_category(category);
                }
                let slot = *slot_of.entry(id).or_insert_with(|| {
                    batches.push((id, Vec::new()));
                    batches.len() - 1
                });
                batches[slot].1.push(instance);
            }
        }

        let mut group = FragmentGroup::new(name);
        for (shape, instances) in batches {
            group.add_fragment(Fragment::create(pool, shape, instances)?)?;
        }

        if self.settings.coordinate_to_origin {
            if let Some(aabb) = group.compute_world_aabb()? {
                group.set_origin(Mat4::from_translation(-aabb.center()))?;
            }
        }

        if let Some(mut table) = properties {
            table.retain_entities(|id| !excluded.contains(&id));
            group.set_properties(Some(table))?;
        }

        reservation.commit();
        log::info!(
            "Converted '{}': {} fragments, {} instances, {} entities excluded, {} placements skipped",
            name,
            group.fragment_count()?,
            group.instance_count()?,
            excluded.len(),
            skipped
        );
        Ok(group)
    }
}
