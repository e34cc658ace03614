pub mod answer;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod knowledge;
pub mod llm;
pub mod pipeline;

pub use answer::{AnswerAssembler, AnswerEvent};
pub use config::Config;
pub use error::{Result, TcmRagError, EMPTY_KNOWLEDGE_ANSWER};
pub use knowledge::{parse_entities, KnowledgeBundle, KnowledgeStore};
pub use pipeline::Pipeline;
