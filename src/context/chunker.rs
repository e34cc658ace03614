use crate::knowledge::{render_entity, KnowledgeBundle};

/// Characters that end a sentence for truncation purposes.
const SENTENCE_ENDS: [char; 4] = ['。', '！', '？', '\n'];

/// Marker appended when no sentence boundary was found.
const ELLIPSIS: &str = "...";

/// A run of whole entity blocks sent to the model in one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub entities: Vec<String>,
    pub text: String,
    /// Single oversized entity cut down to the size limit.
    pub truncated: bool,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Cut `text` to at most `max_chars` characters, ending on the last
/// sentence terminator inside the window. Without one, hard-cut and
/// append `...`.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    let end = match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => byte_idx,
        None => return text.to_string(),
    };
    let window = &text[..end];
    match window.char_indices().rev().find(|(_, c)| SENTENCE_ENDS.contains(c)) {
        Some((idx, c)) => window[..idx + c.len_utf8()].to_string(),
        None => format!("{}{}", window, ELLIPSIS),
    }
}

/// Packs entity blocks into chunks of at most `max_chunk_size` characters.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    max_chunk_size: usize,
}

struct Pending {
    entities: Vec<String>,
    text: String,
    size: usize,
}

impl Pending {
    fn new() -> Self {
        Self {
            entities: Vec::new(),
            text: String::new(),
            size: 0,
        }
    }

    fn flush_into(&mut self, chunks: &mut Vec<Chunk>) {
        if self.entities.is_empty() {
            return;
        }
        let done = std::mem::replace(self, Pending::new());
        chunks.push(Chunk {
            entities: done.entities,
            text: done.text,
            truncated: false,
        });
    }
}

impl ChunkPlanner {
    pub fn new(max_chunk_size: usize) -> Self {
        Self { max_chunk_size }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Split the bundle into chunks, in bundle order. Every entity lands in
    /// exactly one chunk; an entity larger than the limit gets a chunk of
    /// its own, truncated.
    pub fn plan(&self, bundle: &KnowledgeBundle) -> Vec<Chunk> {
        let max = self.max_chunk_size;
        let mut chunks = Vec::new();
        let mut pending = Pending::new();

        for (entity, neighborhood) in bundle.iter() {
            let block = render_entity(entity, neighborhood);
            let size = block.chars().count();

            if size > max {
                pending.flush_into(&mut chunks);
                log::debug!(
                    "Entity {:?} renders to {} chars, truncating to {}",
                    entity,
                    size,
                    max
                );
                chunks.push(Chunk {
                    entities: vec![entity.to_string()],
                    text: truncate_at_sentence(&block, max),
                    truncated: true,
                });
                continue;
            }

            if pending.size > 0 && pending.size + size > max {
                pending.flush_into(&mut chunks);
            }
            pending.entities.push(entity.to_string());
            pending.text.push_str(&block);
            pending.size += size;
        }
        pending.flush_into(&mut chunks);

        log::info!(
            "Planned {} chunks for {} entities (limit {} chars)",
            chunks.len(),
            bundle.len(),
            max
        );
        chunks
    }
}
