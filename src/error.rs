use thiserror::Error;

/// Fixed answer returned when no knowledge could be gathered for a question.
pub const EMPTY_KNOWLEDGE_ANSWER: &str = "知识库为空，无法回答问题";

/// Main error type for TCMRag
#[derive(Error, Debug)]
pub enum TcmRagError {
    /// Graph store connection or query failure
    #[error("Graph unavailable: {0}")]
    GraphUnavailable(String),

    /// Entity has no matching node or an empty neighborhood
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Remote model call failed (network, non-2xx, truncated stream)
    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    /// A stream frame could not be decoded
    #[error("Malformed stream frame: {0}")]
    MalformedStream(String),

    /// Knowledge bundle has no entities
    #[error("知识库为空，无法回答问题")]
    EmptyKnowledge,

    /// Overall generation exceeded its deadline
    #[error("Generation timed out after {0}s")]
    Timeout(u64),

    /// Knowledge store read/write errors
    #[error("Knowledge store error: {0}")]
    Store(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TcmRagError {
    /// Message shown to the person asking the question.
    pub fn user_message(&self) -> String {
        match self {
            TcmRagError::EmptyKnowledge => EMPTY_KNOWLEDGE_ANSWER.to_string(),
            TcmRagError::Timeout(_) => format!("生成回答超时: {}", self),
            other => format!("生成回答出错: {}", other),
        }
    }

    /// True for failures of the remote model (as opposed to local ones).
    pub fn is_remote(&self) -> bool {
        matches!(self, TcmRagError::RemoteCall(_) | TcmRagError::MalformedStream(_))
    }
}

/// Convenient Result type using TcmRagError
pub type Result<T> = std::result::Result<T, TcmRagError>;
