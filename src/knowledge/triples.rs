//! Flat `(subject, predicate, object)` export of a bundle.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use super::serializer::value_text;
use super::KnowledgeBundle;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    fn new(subject: &str, predicate: &str, object: String) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object,
        }
    }
}

fn push_unique(triples: &mut Vec<Triple>, triple: Triple) {
    if !triples.contains(&triple) {
        triples.push(triple);
    }
}

/// Seed properties, relationships and herb properties as triples,
/// deduplicated in first-seen order.
pub fn to_triples(bundle: &KnowledgeBundle) -> Vec<Triple> {
    let mut triples = Vec::new();
    for (entity, neighborhood) in bundle.iter() {
        if let Some(props) = &neighborhood.node_properties {
            for (k, v) in props {
                push_unique(&mut triples, Triple::new(entity, k, value_text(v)));
            }
        }
        for rel in &neighborhood.relationships {
            push_unique(
                &mut triples,
                Triple::new(&rel.source, &rel.relation, rel.target.clone()),
            );
            if let Some(props) = &rel.target_properties {
                for (k, v) in props {
                    push_unique(&mut triples, Triple::new(&rel.target, k, value_text(v)));
                }
            }
        }
    }
    triples
}

/// Write one `subject\tpredicate\tobject` line per triple.
pub fn write_triples_tsv(path: &Path, triples: &[Triple]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut out = std::io::BufWriter::new(file);
    for t in triples {
        writeln!(out, "{}\t{}\t{}", t.subject, t.predicate, t.object)?;
    }
    out.flush()?;
    Ok(())
}
