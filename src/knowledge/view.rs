use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::KnowledgeBundle;

/// Colour used for every node in the visualisation.
pub const NODE_COLOR: &str = "#1976d2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewNode {
    pub id: String,
    pub label: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewLink {
    pub source: String,
    pub target: String,
    pub label: String,
}

/// Node/link graph for a force-directed front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<ViewNode>,
    pub links: Vec<ViewLink>,
}

impl GraphView {
    /// Every query entity and relationship endpoint once, one link per
    /// relationship. Properties are not drawn.
    pub fn from_bundle(bundle: &KnowledgeBundle) -> Self {
        let mut view = GraphView::default();
        let mut seen: HashSet<String> = HashSet::new();

        let mut add_node = |view: &mut GraphView, name: &str| {
            if seen.insert(name.to_string()) {
                view.nodes.push(ViewNode {
                    id: name.to_string(),
                    label: name.to_string(),
                    color: NODE_COLOR.to_string(),
                });
            }
        };

        for (entity, neighborhood) in bundle.iter() {
            add_node(&mut view, entity);
            for rel in &neighborhood.relationships {
                add_node(&mut view, &rel.source);
                add_node(&mut view, &rel.target);
                view.links.push(ViewLink {
                    source: rel.source.clone(),
                    target: rel.target.clone(),
                    label: rel.relation.clone(),
                });
            }
        }
        view
    }
}
