use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use futures_util::StreamExt;
use tokio::sync::Semaphore;

use super::chunker::{truncate_at_sentence, Chunk, ChunkPlanner};
use super::prompts;
use super::transcript::Transcript;
use crate::answer::AnswerAssembler;
use crate::config::ContextConfig;
use crate::knowledge::KnowledgeBundle;
use crate::llm::{collect_deltas, ChatModel, Role, Turn};
use crate::{Result, TcmRagError};

/// Feeds a knowledge bundle to the model in bounded batches, then asks for
/// the final answer.
///
/// Batches run one after another. Inside a batch every chunk is its own
/// request, built on the transcript as it stood when the batch started,
/// with at most `max_parallel_requests` in flight. Replies are folded back
/// in submission order once the whole batch is done.
pub struct ContextOrchestrator {
    model: Arc<dyn ChatModel>,
    config: ContextConfig,
    planner: ChunkPlanner,
}

/// Outcome of one knowledge-part request.
struct PartResult {
    index: usize,
    part: String,
    reply: Result<String>,
}

async fn request_part(
    model: &dyn ChatModel,
    limiter: &Semaphore,
    turns: Vec<Turn>,
) -> Result<String> {
    let _permit = limiter
        .acquire()
        .await
        .map_err(|e| TcmRagError::RemoteCall(format!("request limiter closed: {}", e)))?;
    let stream = model.stream_chat(&turns).await?;
    collect_deltas(stream).await
}

impl ContextOrchestrator {
    /// Fails with `TcmRagError::Config` when a limit is zero or the chunk
    /// size does not fit in the context budget.
    pub fn new(model: Arc<dyn ChatModel>, config: ContextConfig) -> Result<Self> {
        config.validate()?;
        let planner = ChunkPlanner::new(config.max_chunk_size);
        Ok(Self {
            model,
            config,
            planner,
        })
    }

    fn opening(&self, question: &str) -> Transcript {
        let mut transcript =
            Transcript::new(prompts::SYSTEM_PROMPT, self.config.max_context_length);
        transcript.push(Role::User, prompts::preamble(question));
        transcript.push(Role::Assistant, prompts::ACKNOWLEDGEMENT);
        transcript
    }

    async fn run_batch(
        &self,
        transcript: &Transcript,
        batch: &[Chunk],
        first_index: usize,
        limiter: &Semaphore,
    ) -> Vec<PartResult> {
        let requests = batch.iter().enumerate().map(|(offset, chunk)| {
            let index = first_index + offset;
            let text = truncate_at_sentence(&chunk.text, self.planner.max_chunk_size());
            let part = prompts::knowledge_part(index, &text);

            let mut request = transcript.clone();
            request.push(Role::User, part.clone());
            let turns = request.into_turns();

            async move {
                let reply = request_part(self.model.as_ref(), limiter, turns).await;
                PartResult { index, part, reply }
            }
        });
        join_all(requests).await
    }

    /// Answer `question` from `bundle`, pushing deltas of the final reply into
    /// `answer` as they arrive.
    ///
    /// Failed knowledge parts are logged and left out. A failure of the final
    /// request is returned as the error of the whole generation.
    pub async fn generate(
        &self,
        question: &str,
        bundle: &KnowledgeBundle,
        answer: &mut AnswerAssembler,
    ) -> Result<()> {
        if bundle.is_empty() {
            return Err(TcmRagError::EmptyKnowledge);
        }
        let started = Instant::now();

        let chunks = self.planner.plan(bundle);
        let mut transcript = self.opening(question);
        let limiter = Semaphore::new(self.config.max_parallel_requests);

        let batch_size = self.config.max_chunks_per_batch;
        let batch_count = chunks.len().div_ceil(batch_size);
        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            log::info!(
                "Sending knowledge batch {}/{} ({} parts)",
                batch_no + 1,
                batch_count,
                batch.len()
            );
            let results = self
                .run_batch(&transcript, batch, batch_no * batch_size + 1, &limiter)
                .await;

            for result in results {
                match result.reply {
                    Ok(reply) => {
                        transcript.push(Role::User, result.part);
                        transcript.push(Role::Assistant, reply);
                    }
                    Err(e) if e.is_remote() => {
                        log::warn!("Knowledge part {} failed, skipping: {}", result.index, e);
                    }
                    Err(e) => {
                        log::error!(
                            "Knowledge part {} failed locally, skipping: {}",
                            result.index,
                            e
                        );
                    }
                }
            }
        }

        transcript.push(Role::User, prompts::final_prompt(question));
        log::debug!(
            "Final request: {} turns, {}/{} chars",
            transcript.turns().len(),
            transcript.char_len(),
            transcript.budget()
        );

        let mut stream = self.model.stream_chat(transcript.turns()).await?;
        while let Some(delta) = stream.next().await {
            answer.push(&delta?).await;
        }

        log::info!(
            "Answer complete: {} chars in {:.1}s",
            answer.text().chars().count(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
