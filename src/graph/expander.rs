//! Fixed four-hop neighborhood expansion.
//!
//! Each hop has its own handler that consumes the previous hop's output:
//!
//! 1. seed: every edge of nodes whose name contains the entity
//! 2. synonyms: `同义词` edges of each hop-1 synonym (exact name)
//! 3. indications: `主治` edges from each hop-2 target into `方剂` nodes
//! 4. formulas: every edge of each hop-3 formula
//!
//! Depth is capped at four; hop-2 targets are not fed back into hop 2.

use std::sync::Arc;

use super::{
    EdgeQuery, EdgeRecord, GraphClient, PropertyMap, FORMULA_LABEL, HERB_LABEL, NAME_KEY,
    SYNONYM_RELATION, TREATS_RELATION,
};
use crate::knowledge::{Hop, KnowledgeBundle, Neighborhood, Relationship};
use crate::{Result, TcmRagError};

/// An entity whose expansion failed.
#[derive(Debug)]
pub struct EntityFailure {
    pub entity: String,
    pub error: TcmRagError,
}

/// Result of expanding a list of entities.
#[derive(Debug, Default)]
pub struct BundleOutcome {
    pub bundle: KnowledgeBundle,
    /// Entities with no node or no relationships; omitted, not failed.
    pub missing: Vec<String>,
    pub failures: Vec<EntityFailure>,
}

struct SeedHop {
    relationships: Vec<Relationship>,
    synonyms: Vec<String>,
    seed_properties: Option<PropertyMap>,
}

struct SynonymHop {
    relationships: Vec<Relationship>,
    targets: Vec<String>,
}

struct IndicationHop {
    relationships: Vec<Relationship>,
    formulas: Vec<String>,
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Properties to attach to an edge whose far end is a herb.
///
/// From a formula only the keys mentioning that formula are kept (its
/// dosage and role fields); from anything else every key but `name`.
fn herb_properties(record: &EdgeRecord) -> Option<PropertyMap> {
    if !record.target_has(HERB_LABEL) {
        return None;
    }
    let from_formula = record.source_has(FORMULA_LABEL);
    let props: PropertyMap = record
        .target_properties
        .iter()
        .filter(|(k, _)| k.as_str() != NAME_KEY)
        .filter(|(k, _)| !from_formula || k.contains(record.source.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if props.is_empty() {
        None
    } else {
        Some(props)
    }
}

fn relationship(record: &EdgeRecord, hop: Hop) -> Relationship {
    Relationship {
        source: record.source.clone(),
        relation: record.relation.clone(),
        target: record.target.clone(),
        target_labels: record.target_labels.clone(),
        target_properties: None,
        via_synonym: None,
        from_formula: None,
        hop,
    }
}

/// Expands query entities into neighborhoods over a `GraphClient`.
pub struct NeighborhoodExpander {
    graph: Arc<dyn GraphClient>,
}

impl NeighborhoodExpander {
    pub fn new(graph: Arc<dyn GraphClient>) -> Self {
        Self { graph }
    }

    async fn hop_seed(&self, entity: &str) -> Result<SeedHop> {
        let records = self.graph.query_edges(&EdgeQuery::containing(entity)).await?;

        let mut relationships = Vec::with_capacity(records.len());
        let mut synonyms = Vec::new();
        for record in &records {
            let mut rel = relationship(record, Hop::Seed);
            rel.target_properties = herb_properties(record);
            relationships.push(rel);
            if record.relation == SYNONYM_RELATION {
                push_unique(&mut synonyms, &record.target);
            }
        }

        // only the first record decides whether the seed is a herb
        let seed_properties = records
            .first()
            .filter(|first| first.source_has(HERB_LABEL))
            .map(|first| {
                first
                    .source_properties
                    .iter()
                    .filter(|(k, _)| k.as_str() != NAME_KEY)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<PropertyMap>()
            })
            .filter(|props| !props.is_empty());

        Ok(SeedHop {
            relationships,
            synonyms,
            seed_properties,
        })
    }

    async fn hop_synonyms(&self, synonyms: &[String]) -> Result<SynonymHop> {
        let mut relationships = Vec::new();
        let mut targets = Vec::new();
        for synonym in synonyms {
            let query = EdgeQuery::exact(synonym.as_str()).relation(SYNONYM_RELATION);
            for record in self.graph.query_edges(&query).await? {
                let mut rel = relationship(&record, Hop::Synonym);
                rel.via_synonym = Some(synonym.clone());
                relationships.push(rel);
                push_unique(&mut targets, &record.target);
            }
        }
        Ok(SynonymHop {
            relationships,
            targets,
        })
    }

    async fn hop_indications(&self, targets: &[String]) -> Result<IndicationHop> {
        let mut relationships = Vec::new();
        let mut formulas = Vec::new();
        for target in targets {
            let query = EdgeQuery::exact(target.as_str())
                .relation(TREATS_RELATION)
                .target_label(FORMULA_LABEL);
            for record in self.graph.query_edges(&query).await? {
                relationships.push(relationship(&record, Hop::Indication));
                push_unique(&mut formulas, &record.target);
            }
        }
        Ok(IndicationHop {
            relationships,
            formulas,
        })
    }

    async fn hop_formulas(&self, formulas: &[String]) -> Result<Vec<Relationship>> {
        let mut relationships = Vec::new();
        for formula in formulas {
            for record in self.graph.query_edges(&EdgeQuery::exact(formula.as_str())).await? {
                let mut rel = relationship(&record, Hop::Formula);
                rel.target_properties = herb_properties(&record);
                rel.from_formula = Some(formula.clone());
                relationships.push(rel);
            }
        }
        Ok(relationships)
    }

    /// Expand one entity. `EntityNotFound` when no node name contains it
    /// or nothing was found around it.
    pub async fn expand(&self, entity: &str) -> Result<Neighborhood> {
        if !self.graph.node_matches(entity).await? {
            return Err(TcmRagError::EntityNotFound(entity.to_string()));
        }

        let seed = self.hop_seed(entity).await?;
        let synonyms = self.hop_synonyms(&seed.synonyms).await?;
        let indications = self.hop_indications(&synonyms.targets).await?;
        let formulas = self.hop_formulas(&indications.formulas).await?;

        log::debug!(
            "Entity {:?}: hop1={} hop2={} hop3={} hop4={}",
            entity,
            seed.relationships.len(),
            synonyms.relationships.len(),
            indications.relationships.len(),
            formulas.len()
        );

        let mut relationships = seed.relationships;
        relationships.extend(synonyms.relationships);
        relationships.extend(indications.relationships);
        relationships.extend(formulas);

        if relationships.is_empty() {
            return Err(TcmRagError::EntityNotFound(entity.to_string()));
        }

        Ok(Neighborhood {
            query_node: entity.to_string(),
            relationships,
            node_properties: seed.seed_properties,
        })
    }

    /// Expand every entity in order. Failures are logged and listed; they
    /// never stop the remaining entities.
    pub async fn collect(&self, entities: &[String]) -> BundleOutcome {
        let mut outcome = BundleOutcome::default();
        for entity in entities {
            match self.expand(entity).await {
                Ok(neighborhood) => {
                    outcome.bundle.insert(entity.as_str(), neighborhood);
                }
                Err(TcmRagError::EntityNotFound(_)) => {
                    log::debug!("Entity {:?} not in graph, skipping", entity);
                    outcome.missing.push(entity.clone());
                }
                Err(e) => {
                    log::warn!("Expansion failed for entity {:?}: {}", entity, e);
                    outcome.failures.push(EntityFailure {
                        entity: entity.clone(),
                        error: e,
                    });
                }
            }
        }
        log::info!(
            "Resolved {}/{} entities ({} relationships, {} missing, {} failures)",
            outcome.bundle.len(),
            entities.len(),
            outcome.bundle.relationship_count(),
            outcome.missing.len(),
            outcome.failures.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SnapshotGraph;
    use async_trait::async_trait;

    /// Fails every edge query on one name, delegates the rest.
    struct FailingGraph {
        inner: SnapshotGraph,
        poisoned: &'static str,
    }

    #[async_trait]
    impl GraphClient for FailingGraph {
        async fn node_matches(&self, fragment: &str) -> Result<bool> {
            if fragment == self.poisoned {
                return Ok(true);
            }
            self.inner.node_matches(fragment).await
        }

        async fn query_edges(&self, query: &EdgeQuery) -> Result<Vec<EdgeRecord>> {
            if query.name == self.poisoned {
                return Err(TcmRagError::GraphUnavailable("connection reset".to_string()));
            }
            self.inner.query_edges(query).await
        }
    }

    fn symptom_graph() -> SnapshotGraph {
        SnapshotGraph::default()
            .with_node("肚子疼", &["症状"], &[])
            .with_node("腹痛", &["症状"], &[])
            .with_node("脘腹痛", &["症状"], &[])
            .with_node("四君子汤", &[FORMULA_LABEL], &[("出处", "太平惠民和剂局方")])
            .with_node(
                "人参",
                &[HERB_LABEL],
                &[("性味", "甘、微苦，微温"), ("四君子汤用量", "9g")],
            )
            .with_node("理中丸", &[FORMULA_LABEL], &[])
            .with_edge("肚子疼", SYNONYM_RELATION, "腹痛")
            .with_edge("腹痛", SYNONYM_RELATION, "脘腹痛")
            .with_edge("脘腹痛", TREATS_RELATION, "四君子汤")
            .with_edge("四君子汤", "组成", "人参")
            // not a synonym edge: must not be followed at hop 2
            .with_edge("腹痛", "相关", "理中丸")
            // names that only contain a hop-2 target or a hop-3 formula
            .with_node("胃脘腹痛", &["症状"], &[])
            .with_node("小建中汤", &[FORMULA_LABEL], &[])
            .with_edge("胃脘腹痛", TREATS_RELATION, "小建中汤")
            .with_node("加味四君子汤", &[FORMULA_LABEL], &[])
            .with_node("白术", &[HERB_LABEL], &[])
            .with_edge("加味四君子汤", "组成", "白术")
    }

    fn expander(graph: impl GraphClient + 'static) -> NeighborhoodExpander {
        NeighborhoodExpander::new(Arc::new(graph))
    }

    #[tokio::test]
    async fn test_unknown_entity_is_absent() {
        let expander = expander(symptom_graph());
        assert!(matches!(
            expander.expand("桂枝").await,
            Err(TcmRagError::EntityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_isolated_node_is_absent() {
        let graph = SnapshotGraph::default().with_node("孤立", &[], &[]);
        let expander = expander(graph);
        assert!(matches!(
            expander.expand("孤立").await,
            Err(TcmRagError::EntityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_synonym_chain_reaches_formula() {
        let expander = expander(symptom_graph());
        let hood = expander.expand("肚子疼").await.unwrap();

        let hops: Vec<Hop> = hood.relationships.iter().map(|r| r.hop).collect();
        for hop in [Hop::Seed, Hop::Synonym, Hop::Indication, Hop::Formula] {
            assert!(hops.contains(&hop), "missing {:?} in {:?}", hop, hops);
        }

        let synonym = hood.at_hop(Hop::Synonym).next().unwrap();
        assert_eq!(synonym.via_synonym.as_deref(), Some("腹痛"));
        assert!(hood
            .at_hop(Hop::Synonym)
            .all(|r| r.relation == SYNONYM_RELATION && r.source == "腹痛"));

        let indication: Vec<_> = hood.at_hop(Hop::Indication).collect();
        assert_eq!(indication.len(), 1);
        assert_eq!(indication[0].target, "四君子汤");
        assert_eq!(indication[0].relation, TREATS_RELATION);

        assert!(hood
            .at_hop(Hop::Formula)
            .all(|r| r.from_formula.as_deref() == Some("四君子汤")));
        assert!(!hood.relationships.iter().any(|r| r.target == "理中丸"));
    }

    #[tokio::test]
    async fn test_later_hops_match_names_exactly() {
        let expander = expander(symptom_graph());
        let hood = expander.expand("肚子疼").await.unwrap();

        // 胃脘腹痛 contains the hop-2 target 脘腹痛 but is a different node
        assert!(hood
            .at_hop(Hop::Indication)
            .all(|r| r.source == "脘腹痛" && r.target != "小建中汤"));
        // 加味四君子汤 contains the hop-3 formula 四君子汤
        assert!(hood.at_hop(Hop::Formula).all(|r| r.source == "四君子汤"));
        for name in ["胃脘腹痛", "小建中汤", "加味四君子汤", "白术"] {
            assert!(
                !hood
                    .relationships
                    .iter()
                    .any(|r| r.source == name || r.target == name),
                "{} leaked into the neighborhood",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_formula_to_herb_keeps_formula_keys_only() {
        let expander = expander(symptom_graph());
        let hood = expander.expand("肚子疼").await.unwrap();
        let herb = hood
            .at_hop(Hop::Formula)
            .find(|r| r.target == "人参")
            .unwrap();
        let props = herb.target_properties.as_ref().unwrap();
        let keys: Vec<_> = props.keys().cloned().collect();
        assert_eq!(keys, vec!["四君子汤用量"]);
    }

    #[tokio::test]
    async fn test_non_formula_to_herb_keeps_all_but_name() {
        let graph = SnapshotGraph::default()
            .with_node("气虚", &["证候"], &[])
            .with_node(
                "黄芪",
                &[HERB_LABEL],
                &[("性味", "甘，微温"), ("归经", "肺、脾经")],
            )
            .with_edge("气虚", "宜用", "黄芪");
        let expander = expander(graph);
        let hood = expander.expand("气虚").await.unwrap();
        let props = hood.relationships[0].target_properties.as_ref().unwrap();
        let keys: Vec<_> = props.keys().cloned().collect();
        assert_eq!(keys, vec!["性味", "归经"]);
        assert!(hood.node_properties.is_none());
    }

    #[tokio::test]
    async fn test_herb_seed_gets_node_properties() {
        let graph = SnapshotGraph::default()
            .with_node("麻黄", &[HERB_LABEL], &[("性味", "辛、微苦，温")])
            .with_node("麻黄汤", &[FORMULA_LABEL], &[])
            .with_edge("麻黄汤", "组成", "麻黄");
        let expander = expander(graph);
        // "麻黄" also matches 麻黄汤, but the herb node is listed first
        let hood = expander.expand("麻黄").await.unwrap();
        let props = hood.node_properties.unwrap();
        assert_eq!(props.get("性味").unwrap(), "辛、微苦，温");
        assert!(props.get(NAME_KEY).is_none());
    }

    #[tokio::test]
    async fn test_failing_entity_does_not_stop_others() {
        let graph = FailingGraph {
            inner: SnapshotGraph::default()
                .with_node("Y", &[], &[])
                .with_node("Z", &[], &[])
                .with_edge("Y", "相关", "Z"),
            poisoned: "X",
        };
        let expander = expander(graph);
        let outcome = expander
            .collect(&["X".to_string(), "Y".to_string()])
            .await;

        let entities: Vec<_> = outcome.bundle.entities().collect();
        assert_eq!(entities, vec!["Y"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].entity, "X");
        assert!(matches!(
            outcome.failures[0].error,
            TcmRagError::GraphUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_collect_skips_missing_entities_silently() {
        let expander = expander(symptom_graph());
        let outcome = expander
            .collect(&["桂枝".to_string(), "腹痛".to_string()])
            .await;
        assert_eq!(outcome.bundle.len(), 1);
        assert_eq!(outcome.missing, vec!["桂枝"]);
        assert!(outcome.failures.is_empty());
    }
}
