//! Question in, answer out: expand entities, persist the bundle, generate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::answer::{AnswerAssembler, AnswerEvent};
use crate::config::{Config, ContextConfig};
use crate::context::ContextOrchestrator;
use crate::error::EMPTY_KNOWLEDGE_ANSWER;
use crate::graph::{self, BundleOutcome, GraphClient, NeighborhoodExpander};
use crate::knowledge::{parse_entities, KnowledgeBundle, KnowledgeStore, DEFAULT_KEY};
use crate::llm::{ChatClient, ChatModel};
use crate::{Result, TcmRagError};

/// Capacity of the channel behind `answer_stream`.
const STREAM_BUFFER: usize = 64;

fn require_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(TcmRagError::InvalidInput("question is empty".to_string()));
    }
    Ok(())
}

pub struct Pipeline {
    expander: NeighborhoodExpander,
    store: KnowledgeStore,
    orchestrator: ContextOrchestrator,
    timeout: Duration,
}

impl Pipeline {
    pub fn new(
        graph: Arc<dyn GraphClient>,
        model: Arc<dyn ChatModel>,
        store: KnowledgeStore,
        context: ContextConfig,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(context.generation_timeout_secs);
        Ok(Self {
            expander: NeighborhoodExpander::new(graph),
            store,
            orchestrator: ContextOrchestrator::new(model, context)?,
            timeout,
        })
    }

    /// Connect the graph and model named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let graph = graph::connect(&config.graph).await?;
        let api_key = config
            .api_key()
            .map_err(|e| TcmRagError::Config(e.to_string()))?;
        let model = ChatClient::new(&config.llm, api_key)?;
        Self::new(
            graph,
            Arc::new(model),
            KnowledgeStore::new(config.knowledge_dir()),
            config.context.clone(),
        )
    }

    /// Override the generation deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// Expand the `/`-separated entity list and store the bundle under the
    /// default key. The stored bundle always reflects this call, even when
    /// it is empty.
    pub async fn gather(&self, entities_raw: &str) -> Result<BundleOutcome> {
        let entities = parse_entities(entities_raw);
        log::info!("Gathering knowledge for {} entities: {:?}", entities.len(), entities);
        let outcome = self.expander.collect(&entities).await;
        self.store.write(DEFAULT_KEY, &outcome.bundle).await?;
        Ok(outcome)
    }

    /// Gather, then answer.
    pub async fn answer(&self, question: &str, entities_raw: &str) -> Result<String> {
        require_question(question)?;
        let outcome = self.gather(entities_raw).await?;
        self.generate(question, &outcome.bundle, AnswerAssembler::new()).await
    }

    /// Answer from a bundle stored earlier under `key`. A missing key
    /// counts as empty knowledge.
    pub async fn answer_from_store(&self, question: &str, key: &str) -> Result<String> {
        require_question(question)?;
        let bundle = self.store.read(key).await?.unwrap_or_default();
        self.generate(question, &bundle, AnswerAssembler::new()).await
    }

    /// Gather and answer on a background task, streaming the answer.
    ///
    /// The stream yields deltas, then exactly one `Finished` or `Error`.
    pub fn answer_stream(
        self: Arc<Self>,
        question: String,
        entities_raw: String,
    ) -> ReceiverStream<AnswerEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            let assembler = AnswerAssembler::streaming(tx.clone());
            let result = match require_question(&question) {
                Ok(()) => match self.gather(&entities_raw).await {
                    Ok(outcome) => self.generate(&question, &outcome.bundle, assembler).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            let last = match result {
                Ok(_) => AnswerEvent::Finished,
                Err(e) => {
                    log::error!("Answer generation failed: {}", e);
                    AnswerEvent::Error(e.user_message())
                }
            };
            if tx.send(last).await.is_err() {
                log::debug!("Answer consumer dropped before completion");
            }
        });
        ReceiverStream::new(rx)
    }

    async fn generate(
        &self,
        question: &str,
        bundle: &KnowledgeBundle,
        mut assembler: AnswerAssembler,
    ) -> Result<String> {
        let run = self.orchestrator.generate(question, bundle, &mut assembler);
        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => Err(TcmRagError::Timeout(self.timeout.as_secs())),
            Ok(Err(TcmRagError::EmptyKnowledge)) => {
                log::info!("No knowledge found, returning the fixed answer");
                assembler.push(EMPTY_KNOWLEDGE_ANSWER).await;
                Ok(assembler.into_text())
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Ok(assembler.into_text()),
        }
    }
}
