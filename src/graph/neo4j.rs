//! Neo4j-backed `GraphClient` (bolt protocol via neo4rs).

use async_trait::async_trait;
use neo4rs::{query, BoltType, Graph, Row};
use serde_json::Value;

use super::{EdgeQuery, EdgeRecord, GraphClient, NameMatch, PropertyMap};
use crate::{Result, TcmRagError};

/// Graph store backed by Neo4j
pub struct Neo4jGraph {
    graph: Graph,
}

impl Neo4jGraph {
    /// Connect to Neo4j server
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| TcmRagError::GraphUnavailable(format!("connect {}: {}", uri, e)))?;
        Ok(Self { graph })
    }
}

/// Build the Cypher text for an edge query. Labels cannot be parameters,
/// so the label is backtick-quoted after stripping backticks.
fn edge_cypher(q: &EdgeQuery) -> String {
    let target = match &q.target_label {
        Some(label) => format!("(m:`{}`)", label.replace('`', "")),
        None => "(m)".to_string(),
    };
    let name_filter = match q.matching {
        NameMatch::Contains => "n.name CONTAINS $name",
        NameMatch::Exact => "n.name = $name",
    };
    let relation_filter = if q.relation.is_some() {
        " AND type(r) = $relation"
    } else {
        ""
    };

    format!(
        "MATCH (n)-[r]-{target} \
         WHERE {name_filter}{relation_filter} \
         RETURN coalesce(n.name, 'Unknown') AS source, type(r) AS relation, \
                coalesce(m.name, 'Unknown') AS target, \
                labels(n) AS source_labels, labels(m) AS target_labels, \
                [k IN keys(n) | [k, n[k]]] AS source_props, \
                [k IN keys(m) | [k, m[k]]] AS target_props"
    )
}

/// Convert a stored property value. Lists (herb aliases, source books)
/// become arrays; temporal values become their ISO text.
fn bolt_to_json(value: BoltType) -> Value {
    match value {
        BoltType::String(s) => Value::String(s.value),
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::from(i.value),
        BoltType::Float(f) => Value::from(f.value),
        BoltType::Null(_) => Value::Null,
        BoltType::List(list) => Value::Array(list.value.into_iter().map(bolt_to_json).collect()),
        BoltType::Map(map) => Value::Object(
            map.value
                .into_iter()
                .map(|(k, v)| (k.value, bolt_to_json(v)))
                .collect(),
        ),
        other @ BoltType::Date(_) => chrono::NaiveDate::try_from(other)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        other @ BoltType::DateTime(_) => chrono::DateTime::<chrono::FixedOffset>::try_from(other)
            .map(|d| Value::String(d.to_rfc3339()))
            .unwrap_or(Value::Null),
        other @ BoltType::LocalDateTime(_) => chrono::NaiveDateTime::try_from(other)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        other => {
            log::debug!("Unsupported property value type, dropped: {:?}", other);
            Value::Null
        }
    }
}

fn pairs_to_properties(pairs: Vec<(String, BoltType)>) -> PropertyMap {
    pairs
        .into_iter()
        .filter(|(_, v)| !matches!(v, BoltType::Null(_)))
        .map(|(k, v)| (k, bolt_to_json(v)))
        .collect()
}

fn decode(e: impl std::fmt::Display) -> TcmRagError {
    TcmRagError::GraphUnavailable(format!("decode row: {}", e))
}

fn row_to_edge(row: &Row) -> Result<EdgeRecord> {
    Ok(EdgeRecord {
        source: row.get("source").map_err(decode)?,
        relation: row.get("relation").map_err(decode)?,
        target: row.get("target").map_err(decode)?,
        source_labels: row.get("source_labels").map_err(decode)?,
        target_labels: row.get("target_labels").map_err(decode)?,
        source_properties: pairs_to_properties(row.get("source_props").map_err(decode)?),
        target_properties: pairs_to_properties(row.get("target_props").map_err(decode)?),
    })
}

#[async_trait]
impl GraphClient for Neo4jGraph {
    async fn node_matches(&self, fragment: &str) -> Result<bool> {
        let q = query(
            "MATCH (n) \
             WHERE n.name IS NOT NULL AND n.name CONTAINS $name \
             RETURN count(n) > 0 AS found",
        )
        .param("name", fragment);

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| TcmRagError::GraphUnavailable(e.to_string()))?;

        match result
            .next()
            .await
            .map_err(|e| TcmRagError::GraphUnavailable(e.to_string()))?
        {
            Some(row) => row
                .get::<bool>("found")
                .map_err(decode),
            None => Ok(false),
        }
    }

    async fn query_edges(&self, edge_query: &EdgeQuery) -> Result<Vec<EdgeRecord>> {
        let mut q = query(&edge_cypher(edge_query)).param("name", edge_query.name.as_str());
        if let Some(relation) = &edge_query.relation {
            q = q.param("relation", relation.as_str());
        }

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| TcmRagError::GraphUnavailable(e.to_string()))?;

        let mut edges = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| TcmRagError::GraphUnavailable(e.to_string()))?
        {
            edges.push(row_to_edge(&row)?);
        }
        log::debug!(
            "Neo4j query on {:?} ({:?}) returned {} edges",
            edge_query.name,
            edge_query.matching,
            edges.len()
        );
        Ok(edges)
    }
}
