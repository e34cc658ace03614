//! Knowledge graph access: the `GraphClient` seam, its Neo4j and snapshot
//! implementations, and the fixed four-hop neighborhood expansion.
//!
//! Queries are directionless: an edge `a -[r]- b` is reported as
//! `(a, r, b)` when querying from `a` and as `(b, r, a)` when querying from `b`.

mod expander;
mod neo4j;
mod snapshot;

pub use expander::{BundleOutcome, EntityFailure, NeighborhoodExpander};
pub use neo4j::Neo4jGraph;
pub use snapshot::{GraphSnapshot, SnapshotEdge, SnapshotGraph, SnapshotNode};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GraphConfig;
use crate::{Result, TcmRagError};

/// Ordered property map of a node (`name` included, as stored).
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// Node label for single herbs.
pub const HERB_LABEL: &str = "中药";
/// Node label for formulas.
pub const FORMULA_LABEL: &str = "方剂";
/// Relation type linking synonymous terms.
pub const SYNONYM_RELATION: &str = "同义词";
/// Relation type linking a formula and what it treats.
pub const TREATS_RELATION: &str = "主治";
/// Property key holding a node's display name.
pub const NAME_KEY: &str = "name";

/// How the query name is compared against node names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// Node name contains the query string.
    Contains,
    /// Node name equals the query string.
    Exact,
}

/// Edge lookup around the nodes selected by `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeQuery {
    pub name: String,
    pub matching: NameMatch,
    /// Only edges of this relation type.
    pub relation: Option<String>,
    /// Only edges whose far end carries this label.
    pub target_label: Option<String>,
}

impl EdgeQuery {
    /// All edges of nodes whose name contains `name`.
    pub fn containing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matching: NameMatch::Contains,
            relation: None,
            target_label: None,
        }
    }

    /// All edges of nodes named exactly `name`.
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            matching: NameMatch::Exact,
            ..Self::containing(name)
        }
    }

    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn target_label(mut self, label: impl Into<String>) -> Self {
        self.target_label = Some(label.into());
        self
    }

    /// Does a node called `node_name` fall under this query?
    pub fn selects(&self, node_name: &str) -> bool {
        match self.matching {
            NameMatch::Contains => node_name.contains(&self.name),
            NameMatch::Exact => node_name == self.name,
        }
    }
}

/// One edge as seen from the queried node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub relation: String,
    pub target: String,
    pub source_labels: Vec<String>,
    pub target_labels: Vec<String>,
    pub source_properties: PropertyMap,
    pub target_properties: PropertyMap,
}

impl EdgeRecord {
    pub fn source_has(&self, label: &str) -> bool {
        self.source_labels.iter().any(|l| l == label)
    }

    pub fn target_has(&self, label: &str) -> bool {
        self.target_labels.iter().any(|l| l == label)
    }
}

/// Read-only access to the property graph.
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// True if any node name contains `fragment`.
    async fn node_matches(&self, fragment: &str) -> Result<bool>;

    /// Edges incident to the nodes selected by `query`, in any direction.
    async fn query_edges(&self, query: &EdgeQuery) -> Result<Vec<EdgeRecord>>;
}

/// Open the graph described by `config`: the JSON snapshot when one is
/// configured, Neo4j otherwise.
pub async fn connect(config: &GraphConfig) -> Result<Arc<dyn GraphClient>> {
    if let Some(path) = &config.snapshot {
        log::info!("Using graph snapshot {}", path.display());
        return Ok(Arc::new(SnapshotGraph::from_file(path)?));
    }

    let password = std::env::var(&config.password_env).map_err(|_| {
        TcmRagError::Config(format!(
            "Environment variable {} not set",
            config.password_env
        ))
    })?;
    log::info!("Connecting to Neo4j at {}", config.uri);
    let graph = Neo4jGraph::connect(&config.uri, &config.user, &password).await?;
    Ok(Arc::new(graph))
}
