//! Knowledge gathered for one question: per-entity neighborhoods, their
//! text rendering, persistence and derived views.

mod entities;
mod serializer;
mod store;
mod triples;
mod view;

pub use entities::parse_entities;
pub use serializer::render_entity;
pub use store::{KnowledgeStore, DEFAULT_KEY};
pub use triples::{to_triples, write_triples_tsv, Triple};
pub use view::{GraphView, ViewLink, ViewNode};

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::graph::PropertyMap;

/// Traversal depth at which a relationship was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Hop {
    /// Edges of the seed node(s).
    Seed = 1,
    /// Synonym edges of a seed synonym.
    Synonym = 2,
    /// Treats edges from a synonym to a formula.
    Indication = 3,
    /// All edges of a formula reached at hop 3.
    Formula = 4,
}

impl From<Hop> for u8 {
    fn from(hop: Hop) -> u8 {
        hop as u8
    }
}

impl TryFrom<u8> for Hop {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Hop::Seed),
            2 => Ok(Hop::Synonym),
            3 => Ok(Hop::Indication),
            4 => Ok(Hop::Formula),
            other => Err(format!("hop must be 1-4, got {}", other)),
        }
    }
}

/// A `(source, relation, target)` edge plus what the traversal learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub relation: String,
    pub target: String,
    #[serde(default)]
    pub target_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_properties: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_synonym: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_formula: Option<String>,
    pub hop: Hop,
}

/// Everything found around one query entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub query_node: String,
    pub relationships: Vec<Relationship>,
    /// Properties of the seed itself when it is a herb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_properties: Option<PropertyMap>,
}

impl Neighborhood {
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    /// Relationships found at `hop`.
    pub fn at_hop(&self, hop: Hop) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.hop == hop)
    }
}

/// Entity → neighborhood, in the order entities were resolved.
///
/// Serializes as a JSON object whose key order is the insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBundle {
    entries: Vec<(String, Neighborhood)>,
}

impl KnowledgeBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity. Empty neighborhoods are rejected (returns false);
    /// an existing entity keeps its position and gets the new neighborhood.
    pub fn insert(&mut self, entity: impl Into<String>, neighborhood: Neighborhood) -> bool {
        if neighborhood.is_empty() {
            return false;
        }
        let entity = entity.into();
        match self.entries.iter_mut().find(|(e, _)| *e == entity) {
            Some(slot) => slot.1 = neighborhood,
            None => self.entries.push((entity, neighborhood)),
        }
        true
    }

    pub fn get(&self, entity: &str) -> Option<&Neighborhood> {
        self.entries
            .iter()
            .find(|(e, _)| e == entity)
            .map(|(_, n)| n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(e, _)| e.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Neighborhood)> {
        self.entries.iter().map(|(e, n)| (e.as_str(), n))
    }

    /// Total relationship count across all entities.
    pub fn relationship_count(&self) -> usize {
        self.entries.iter().map(|(_, n)| n.relationships.len()).sum()
    }
}

impl Serialize for KnowledgeBundle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (entity, neighborhood) in &self.entries {
            map.serialize_entry(entity, neighborhood)?;
        }
        map.end()
    }
}

struct BundleVisitor;

impl<'de> Visitor<'de> for BundleVisitor {
    type Value = KnowledgeBundle;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of entity name to neighborhood")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut access: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        let mut bundle = KnowledgeBundle::new();
        while let Some((entity, neighborhood)) = access.next_entry::<String, Neighborhood>()? {
            bundle.insert(entity, neighborhood);
        }
        Ok(bundle)
    }
}

impl<'de> Deserialize<'de> for KnowledgeBundle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(BundleVisitor)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn rel(source: &str, relation: &str, target: &str, hop: Hop) -> Relationship {
        Relationship {
            source: source.to_string(),
            relation: relation.to_string(),
            target: target.to_string(),
            target_labels: Vec::new(),
            target_properties: None,
            via_synonym: None,
            from_formula: None,
            hop,
        }
    }

    pub fn props(pairs: &[(&str, &str)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect()
    }

    pub fn hood(entity: &str, relationships: Vec<Relationship>) -> Neighborhood {
        Neighborhood {
            query_node: entity.to_string(),
            relationships,
            node_properties: None,
        }
    }

    /// Neighborhood whose rendered block is padded with `filler` characters.
    pub fn sized_hood(entity: &str, filler: usize) -> Neighborhood {
        hood(
            entity,
            vec![rel(entity, "组成", &"药".repeat(filler.max(1)), Hop::Seed)],
        )
    }
}
