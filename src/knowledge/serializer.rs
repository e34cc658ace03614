//! Plain-text rendering of neighborhoods for the model.
//!
//! Block layout:
//!
//! ```text
//! 实体：麻黄
//! 属性：
//! - 性味: 辛、微苦，温
//! 关系：
//! - 麻黄汤 组成 麻黄 (麻黄汤用量: 9g)
//!
//! ```
//!
//! Every line ends with `\n` and a blank line closes the block, so a run of
//! blocks is just their concatenation.

use std::fmt::Write;

use serde_json::Value;

use super::{Neighborhood, Relationship};
use crate::graph::PropertyMap;

pub(super) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn inline_properties(props: &PropertyMap) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{}: {}", k, value_text(v)))
        .collect::<Vec<_>>()
        .join("; ")
}

fn relationship_line(rel: &Relationship) -> String {
    let mut line = format!("- {} {} {}", rel.source, rel.relation, rel.target);
    if let Some(props) = rel.target_properties.as_ref().filter(|p| !p.is_empty()) {
        line.push_str(&format!(" ({})", inline_properties(props)));
    }
    line
}

/// Render one entity's block.
pub fn render_entity(entity: &str, neighborhood: &Neighborhood) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = writeln!(out, "实体：{}", entity);

    if let Some(props) = &neighborhood.node_properties {
        out.push_str("属性：\n");
        for (k, v) in props {
            let _ = writeln!(out, "- {}: {}", k, value_text(v));
        }
    }

    out.push_str("关系：\n");
    for rel in &neighborhood.relationships {
        out.push_str(&relationship_line(rel));
        out.push('\n');
    }

    out.push('\n');
    out
}
