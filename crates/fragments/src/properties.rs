//! Entity metadata attached to a model at load time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fragment::EntityId;

/// Scalar or string property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

pub type EntityProperties = BTreeMap<String, PropertyValue>;

/// entity id -> (key -> value). Ordered, so serialization is stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyTable(BTreeMap<EntityId, EntityProperties>);

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        entity: EntityId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.0
            .entry(entity)
            .or_default()
            .insert(key.into(), value.into())
    }

    pub fn get(&self, entity: EntityId) -> Option<&EntityProperties> {
        self.0.get(&entity)
    }

    pub fn value(&self, entity: EntityId, key: &str) -> Option<&PropertyValue> {
        self.0.get(&entity).and_then(|props| props.get(key))
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.0.keys().copied()
    }

    pub fn retain_entities(&mut self, mut keep: impl FnMut(EntityId) -> bool) {
        self.0.retain(|id, _| keep(*id));
    }

    /// Number of entities carrying properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PropertyTable {
        let mut table = PropertyTable::new();
        table.insert(12, "Name", "Wall-01");
        table.insert(12, "LoadBearing", true);
        table.insert(12, "Height", 3.2);
        table.insert(40, "Storey", 2_i64);
        table
    }

    #[test]
    fn lookup() {
        let table = sample();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.value(12, "Name"),
            Some(&PropertyValue::Text("Wall-01".into()))
        );
        assert_eq!(table.value(40, "Name"), None);
        assert_eq!(table.entities().collect::<Vec<_>>(), vec![12, 40]);
    }

    #[test]
    fn json_keeps_value_kinds() {
        let table = sample();
        let json = table.to_json().unwrap();
        assert!(json.contains("\"Wall-01\""));
        assert_eq!(PropertyTable::from_json(&json).unwrap(), table);
    }

    #[test]
    fn retain_drops_entities() {
        let mut table = sample();
        table.retain_entities(|id| id != 12);
        assert!(table.get(12).is_none());
        assert_eq!(table.len(), 1);
    }
}
