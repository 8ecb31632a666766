use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::markers::CitationKey;

/// Output record for one citation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationContext {
    #[serde(rename = "SECTION")]
    pub section: String,
    #[serde(rename = "CITATION")]
    pub citation: String,
    /// Literal marker text; empty when the marker had none.
    #[serde(rename = "REFERENCE")]
    pub reference: String,
    /// Canonical headings the section was aligned to, when alignment ran.
    #[serde(rename = "ALIGNED SECTION", skip_serializing_if = "Option::is_none")]
    pub aligned_section: Option<Vec<String>>,
}

impl CitationContext {
    pub fn new(section: &str, citation: String, reference: String) -> Self {
        Self {
            section: section.to_string(),
            citation,
            reference,
            aligned_section: None,
        }
    }
}

/// Map keyed by [`CitationKey`] that remembers first-insertion order.
///
/// Re-inserting a key replaces the value in place; the key keeps its
/// original position. Serializes as a JSON object in that order.
#[derive(Debug, Clone)]
pub struct KeyedMap<V> {
    entries: Vec<(CitationKey, V)>,
    positions: HashMap<CitationKey, usize>,
}

impl<V> Default for KeyedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<V> KeyedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the previous value for `key`, if any.
    pub fn insert(&mut self, key: CitationKey, value: V) -> Option<V> {
        match self.positions.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.positions.insert(key, self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: CitationKey) -> Option<&V> {
        self.positions.get(&key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: CitationKey) -> bool {
        self.positions.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CitationKey, &V)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (CitationKey, &mut V)> {
        self.entries.iter_mut().map(|(k, v)| (*k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = CitationKey> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<V: Serialize> Serialize for KeyedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// `CitationKey -> CitationContext`, in first-write order.
pub type CitationMap = KeyedMap<CitationContext>;

/// `CitationKey -> bibliography target id` (leading `#` stripped).
pub type TargetMap = KeyedMap<String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: &str) -> CitationKey {
        CitationKey::parse(n).unwrap()
    }

    #[test]
    fn test_overwrite_keeps_first_position() {
        let mut map = CitationMap::new();
        map.insert(key("cit2"), CitationContext::new("A", "first".into(), "[2]".into()));
        map.insert(key("cit1"), CitationContext::new("A", "other".into(), "[1]".into()));
        let old = map.insert(key("cit2"), CitationContext::new("Figure Caption", "second".into(), "[2]".into()));

        assert_eq!(old.map(|c| c.citation), Some("first".to_string()));
        assert_eq!(map.len(), 2);
        assert_eq!(map.keys().map(|k| k.to_string()).collect::<Vec<_>>(), vec!["cit2", "cit1"]);
        assert_eq!(map.get(key("cit2")).unwrap().section, "Figure Caption");
    }

    #[test]
    fn test_serializes_in_insertion_order() {
        let mut map = CitationMap::new();
        map.insert(key("cit10"), CitationContext::new("Intro", "X [10].".into(), "[10]".into()));
        map.insert(key("cit9"), CitationContext::new("Intro", "Y.".into(), String::new()));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            json,
            r#"{"cit10":{"SECTION":"Intro","CITATION":"X [10].","REFERENCE":"[10]"},"cit9":{"SECTION":"Intro","CITATION":"Y.","REFERENCE":""}}"#
        );
    }

    #[test]
    fn test_aligned_section_serialized_when_present() {
        let mut ctx = CitationContext::new("Intro", "X.".into(), "[1]".into());
        ctx.aligned_section = Some(vec!["Introduction".into()]);
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["ALIGNED SECTION"][0], "Introduction");
    }

    #[test]
    fn test_target_map() {
        let mut targets = TargetMap::new();
        targets.insert(key("cit1"), "b0".into());
        assert_eq!(serde_json::to_string(&targets).unwrap(), r#"{"cit1":"b0"}"#);
    }
}
