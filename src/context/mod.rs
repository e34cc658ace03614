//! Fitting retrieved knowledge into the model's context: chunk planning,
//! the bounded transcript and the batch orchestrator.

mod chunker;
mod orchestrator;
mod prompts;
mod transcript;

pub use chunker::{truncate_at_sentence, Chunk, ChunkPlanner};
pub use orchestrator::ContextOrchestrator;
pub use prompts::{
    compose_question, final_prompt, knowledge_part, preamble, ACKNOWLEDGEMENT, SYSTEM_PROMPT,
};
pub use transcript::Transcript;
