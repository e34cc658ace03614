use std::sync::OnceLock;

use regex::Regex;

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"))
}

/// Split extractor output of the form `a/b/c` into entity names.
///
/// Reasoning blocks (`<think>…</think>`) are dropped first. Names are
/// trimmed; empty and repeated names are skipped, first occurrence wins.
pub fn parse_entities(raw: &str) -> Vec<String> {
    let cleaned = think_block().replace_all(raw, "");
    let mut entities: Vec<String> = Vec::new();
    for part in cleaned.split('/') {
        let name = part.trim();
        if name.is_empty() || entities.iter().any(|e| e == name) {
            continue;
        }
        entities.push(name.to_string());
    }
    entities
}
