//! In-memory `GraphClient` loaded from a JSON snapshot.
//!
//! Snapshot shape:
//! `{"nodes": [{"name", "labels", "properties"}], "edges": [{"source", "relation", "target"}]}`.
//! Edges refer to nodes by name; the first node with a given name wins.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EdgeQuery, EdgeRecord, GraphClient, PropertyMap, NAME_KEY};
use crate::{Result, TcmRagError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl SnapshotNode {
    /// Properties as the store reports them: `name` first, then the rest.
    fn stored_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(NAME_KEY.to_string(), self.name.clone().into());
        for (k, v) in &self.properties {
            if k != NAME_KEY {
                props.insert(k.clone(), v.clone());
            }
        }
        props
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub source: String,
    pub relation: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<SnapshotNode>,
    #[serde(default)]
    pub edges: Vec<SnapshotEdge>,
}

/// Directionless in-memory graph.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGraph {
    snapshot: GraphSnapshot,
}

impl SnapshotGraph {
    pub fn new(snapshot: GraphSnapshot) -> Self {
        Self { snapshot }
    }

    /// Load a snapshot file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TcmRagError::GraphUnavailable(format!("read snapshot {}: {}", path.display(), e))
        })?;
        let snapshot: GraphSnapshot = serde_json::from_str(&text).map_err(|e| {
            TcmRagError::GraphUnavailable(format!("parse snapshot {}: {}", path.display(), e))
        })?;
        log::info!(
            "Loaded graph snapshot: {} nodes, {} edges",
            snapshot.nodes.len(),
            snapshot.edges.len()
        );
        Ok(Self::new(snapshot))
    }

    /// Add a node with labels and `(key, value)` properties.
    pub fn with_node(mut self, name: &str, labels: &[&str], properties: &[(&str, &str)]) -> Self {
        let mut props = PropertyMap::new();
        for (k, v) in properties {
            props.insert(k.to_string(), serde_json::Value::String(v.to_string()));
        }
        self.snapshot.nodes.push(SnapshotNode {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: props,
        });
        self
    }

    /// Add an edge between two named nodes.
    pub fn with_edge(mut self, source: &str, relation: &str, target: &str) -> Self {
        self.snapshot.edges.push(SnapshotEdge {
            source: source.to_string(),
            relation: relation.to_string(),
            target: target.to_string(),
        });
        self
    }

    fn node(&self, name: &str) -> Option<&SnapshotNode> {
        self.snapshot.nodes.iter().find(|n| n.name == name)
    }

    fn record(&self, from: &SnapshotNode, relation: &str, to: &SnapshotNode) -> EdgeRecord {
        EdgeRecord {
            source: from.name.clone(),
            relation: relation.to_string(),
            target: to.name.clone(),
            source_labels: from.labels.clone(),
            target_labels: to.labels.clone(),
            source_properties: from.stored_properties(),
            target_properties: to.stored_properties(),
        }
    }
}

#[async_trait]
impl GraphClient for SnapshotGraph {
    async fn node_matches(&self, fragment: &str) -> Result<bool> {
        Ok(self.snapshot.nodes.iter().any(|n| n.name.contains(fragment)))
    }

    async fn query_edges(&self, query: &EdgeQuery) -> Result<Vec<EdgeRecord>> {
        let mut records = Vec::new();
        let mut seen_names: Vec<&str> = Vec::new();

        for node in self.snapshot.nodes.iter().filter(|n| query.selects(&n.name)) {
            // duplicate names collapse onto the first node
            if seen_names.contains(&node.name.as_str()) {
                continue;
            }
            seen_names.push(&node.name);

            for edge in &self.snapshot.edges {
                if let Some(relation) = &query.relation {
                    if &edge.relation != relation {
                        continue;
                    }
                }
                let other = if edge.source == node.name {
                    &edge.target
                } else if edge.target == node.name {
                    &edge.source
                } else {
                    continue;
                };
                let Some(other) = self.node(other) else {
                    continue;
                };
                if let Some(label) = &query.target_label {
                    if !other.labels.iter().any(|l| l == label) {
                        continue;
                    }
                }
                records.push(self.record(node, &edge.relation, other));
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FORMULA_LABEL, HERB_LABEL, SYNONYM_RELATION, TREATS_RELATION};

    fn sample() -> SnapshotGraph {
        SnapshotGraph::default()
            .with_node("麻黄汤", &[FORMULA_LABEL], &[("出处", "伤寒论")])
            .with_node("麻黄", &[HERB_LABEL], &[("性味", "辛、微苦，温")])
            .with_node("发热", &["症状"], &[])
            .with_node("发烧", &["症状"], &[])
            .with_edge("麻黄汤", "组成", "麻黄")
            .with_edge("麻黄汤", TREATS_RELATION, "发热")
            .with_edge("发烧", SYNONYM_RELATION, "发热")
    }

    #[tokio::test]
    async fn test_node_matches_substring() {
        let graph = sample();
        assert!(graph.node_matches("麻黄").await.unwrap());
        assert!(graph.node_matches("黄汤").await.unwrap());
        assert!(!graph.node_matches("桂枝").await.unwrap());
    }

    #[tokio::test]
    async fn test_edges_are_directionless() {
        let graph = sample();
        let from_herb = graph.query_edges(&EdgeQuery::exact("麻黄")).await.unwrap();
        assert_eq!(from_herb.len(), 1);
        assert_eq!(from_herb[0].source, "麻黄");
        assert_eq!(from_herb[0].target, "麻黄汤");
        assert!(from_herb[0].target_has(FORMULA_LABEL));
    }

    #[tokio::test]
    async fn test_contains_selects_every_matching_node() {
        let graph = sample();
        let edges = graph.query_edges(&EdgeQuery::containing("麻黄")).await.unwrap();
        // 麻黄汤 has two edges, 麻黄 has one
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].source, "麻黄汤");
        assert_eq!(edges[2].source, "麻黄");
    }

    #[tokio::test]
    async fn test_relation_and_label_filters() {
        let graph = sample();
        let edges = graph
            .query_edges(
                &EdgeQuery::exact("发热")
                    .relation(TREATS_RELATION)
                    .target_label(FORMULA_LABEL),
            )
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, "麻黄汤");

        let none = graph
            .query_edges(&EdgeQuery::exact("发热").relation("不存在"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_properties_include_name_first() {
        let graph = sample();
        let edges = graph.query_edges(&EdgeQuery::exact("麻黄汤")).await.unwrap();
        let herb_edge = edges.iter().find(|e| e.target == "麻黄").unwrap();
        let keys: Vec<_> = herb_edge.target_properties.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "性味"]);
    }

    #[test]
    fn test_from_file_rejects_garbage() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("graph.json");
        std::fs::write(&path, "not json").unwrap();
        let err = SnapshotGraph::from_file(&path).unwrap_err();
        assert!(matches!(err, TcmRagError::GraphUnavailable(_)));
    }
}
