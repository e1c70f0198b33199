#![forbid(unsafe_code)]

//! Entity state cache.
//!
//! Holds the latest known state of every entity the remote server has
//! reported. Entries are replaced wholesale per inbound event and never
//! deleted. The cache is owned exclusively by the dispatcher; resolution
//! and template evaluation receive it read-only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The state snapshot of a single entity: the primary state string plus an
/// open attribute map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl EntityState {
    /// Construct from a bare state string with no attributes.
    #[must_use]
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: HashMap::new(),
        }
    }

    /// Whether the primary state is the literal `"on"`.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.state == "on"
    }

    /// Whether the primary state is the literal `"off"`.
    #[must_use]
    pub fn is_off(&self) -> bool {
        self.state == "off"
    }

    /// An attribute coerced to a number, if present and numeric.
    ///
    /// The wire frequently carries numbers as strings; both forms coerce.
    #[must_use]
    pub fn numeric_attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(as_number)
    }

    /// The primary state coerced to a number, if numeric.
    #[must_use]
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok()
    }
}

/// Coerce a JSON value to f64: numbers directly, strings by parsing.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Latest known state of every referenced entity, keyed by entity id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateCache {
    entities: HashMap<String, EntityState>,
}

impl StateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from an initial full snapshot.
    #[must_use]
    pub fn from_snapshot(entities: HashMap<String, EntityState>) -> Self {
        Self { entities }
    }

    /// Replace (or create) an entity's state wholesale.
    pub fn apply(&mut self, entity_id: impl Into<String>, state: EntityState) {
        self.entities.insert(entity_id.into(), state);
    }

    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        self.entities.get(entity_id)
    }

    #[must_use]
    pub fn contains(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over all `(entity_id, state)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &EntityState)> {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_replaces_wholesale() {
        let mut cache = StateCache::new();
        let mut first = EntityState::new("on");
        first.attributes.insert("brightness".into(), json!(200));
        cache.apply("light.desk", first);

        // A later event with no attributes must not retain the old ones.
        cache.apply("light.desk", EntityState::new("off"));
        let state = cache.get("light.desk").unwrap();
        assert!(state.is_off());
        assert!(state.attributes.is_empty());
    }

    #[test]
    fn numeric_coercion_from_string_and_number() {
        let mut state = EntityState::new("21.5");
        state.attributes.insert("min".into(), json!("0"));
        state.attributes.insert("max".into(), json!(255));
        state.attributes.insert("name".into(), json!("desk"));

        assert_eq!(state.numeric_state(), Some(21.5));
        assert_eq!(state.numeric_attribute("min"), Some(0.0));
        assert_eq!(state.numeric_attribute("max"), Some(255.0));
        assert_eq!(state.numeric_attribute("name"), None);
        assert_eq!(state.numeric_attribute("absent"), None);
    }

    #[test]
    fn missing_entity_is_none_not_error() {
        let cache = StateCache::new();
        assert!(cache.get("sensor.nope").is_none());
    }

    #[test]
    fn wire_shape_deserializes() {
        let state: EntityState = serde_json::from_value(json!({
            "state": "on",
            "attributes": {"brightness": 128, "friendly_name": "Desk"}
        }))
        .unwrap();
        assert!(state.is_on());
        assert_eq!(state.numeric_attribute("brightness"), Some(128.0));
    }
}
