//! The Execution Dispatcher: three strategies over one request abstraction.
//!
//! `simulate` never touches the model runner; `execute` runs it to
//! completion; `execute_streaming` forwards its incremental units over a
//! bounded channel in production order, terminated by exactly one `done` or
//! `error` chunk.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use agora_core::{
    AgentError, ConversationMemory, ExecutionMode, ExecutionRequest, ExecutionResponse,
    IncrementalUnit, ModelCall, ModelRunner, StreamChunk, TraceEntry, Turn, Usage,
};
use agora_sessions::SessionHandle;

use crate::factory::AgentFactory;
use crate::handle::AgentHandle;

/// Reasoning iterations granted when the request doesn't set a budget.
const DEFAULT_STEP_BUDGET: u32 = 8;

/// Chunk buffer between producer and consumer. Sends block when the consumer
/// lags, so a slow reader backpressures the producer.
const STREAM_BUFFER: usize = 32;

pub struct ExecutionDispatcher {
    factory: Arc<AgentFactory>,
    runner: Arc<dyn ModelRunner>,
    request_timeout: Option<Duration>,
}

impl ExecutionDispatcher {
    pub fn new(
        factory: Arc<AgentFactory>,
        runner: Arc<dyn ModelRunner>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            factory,
            runner,
            request_timeout,
        }
    }

    /// Fast path: deterministic placeholder response, no model call.
    pub async fn simulate(
        &self,
        agent_id: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionResponse, AgentError> {
        let handle = self.factory.resolve(agent_id).await?;
        let descriptor = handle.descriptor();
        debug!(agent_id, "Simulated execution");

        Ok(ExecutionResponse {
            agent_id: agent_id.to_string(),
            conversation_id: request.conversation_id.clone(),
            text: format!(
                "[{}] mock response to: {}",
                descriptor.display_name(),
                request.input
            ),
            trace: vec![TraceEntry::new(
                1,
                "simulate",
                json!({ "capabilities": handle.capability_names() }),
            )],
            usage: Usage::default(),
            mode: ExecutionMode::Mock,
        })
    }

    /// Full synchronous execution through the model runner.
    pub async fn execute(
        &self,
        agent_id: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionResponse, AgentError> {
        let started = Instant::now();
        let (handle, session, conversation_id) = self
            .factory
            .resolve_with_session(agent_id, request.conversation_id.as_deref())
            .await?;

        if let Some(session) = &session {
            session
                .append(Turn::user(&request.input))
                .await
                .map_err(|e| AgentError::session(agent_id, e.to_string()))?;
        }

        let call = build_call(&handle, &request, session.clone());
        let run = self.runner.run(call);
        let output = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                AgentError::Timeout {
                    agent_id: agent_id.to_string(),
                    elapsed_ms: limit.as_millis() as u64,
                }
            })?,
            None => run.await,
        }
        .map_err(|e| AgentError::model(agent_id, e.to_string()))?;

        if let Some(session) = &session {
            session
                .append(Turn::assistant(&output.text))
                .await
                .map_err(|e| AgentError::session(agent_id, e.to_string()))?;
        }

        info!(
            agent_id,
            latency_ms = started.elapsed().as_millis() as u64,
            steps = output.trace.len(),
            "Execution complete"
        );
        Ok(ExecutionResponse {
            agent_id: agent_id.to_string(),
            conversation_id,
            text: output.text,
            trace: output.trace,
            usage: Usage {
                latency_ms: started.elapsed().as_millis() as u64,
                ..output.usage
            },
            mode: ExecutionMode::Real,
        })
    }

    /// Streaming execution: ordered chunks, one terminal chunk, consumer drop
    /// cancels forwarding without touching the tool server.
    pub async fn execute_streaming(
        &self,
        agent_id: &str,
        request: ExecutionRequest,
    ) -> Result<ReceiverStream<StreamChunk>, AgentError> {
        // Validation happens here, identically to the other entry points,
        // before any chunk is produced.
        let (handle, session, conversation_id) = self
            .factory
            .resolve_with_session(agent_id, request.conversation_id.as_deref())
            .await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let call = build_call(&handle, &request, session.clone());
        let runner = Arc::clone(&self.runner);
        let limit = self.request_timeout;
        let agent_id = agent_id.to_string();

        tokio::spawn(async move {
            let metadata = StreamChunk::Metadata {
                agent_id: agent_id.clone(),
                conversation_id,
                mode: ExecutionMode::Real,
                started_at: Utc::now(),
            };
            if tx.send(metadata).await.is_err() {
                return;
            }

            let work = produce(runner, call, session, tx.clone(), agent_id.clone());
            match limit {
                Some(limit) => {
                    if tokio::time::timeout(limit, work).await.is_err() {
                        warn!(agent_id = %agent_id, "Streaming request timed out");
                        let _ = tx
                            .send(StreamChunk::Error {
                                agent_id,
                                message: format!(
                                    "request timed out after {}ms",
                                    limit.as_millis()
                                ),
                            })
                            .await;
                    }
                }
                None => work.await,
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

fn build_call(
    handle: &AgentHandle,
    request: &ExecutionRequest,
    session: Option<Arc<SessionHandle>>,
) -> ModelCall {
    let descriptor = handle.descriptor();
    ModelCall {
        agent_id: descriptor.id.clone(),
        agent_name: descriptor.display_name().to_string(),
        instructions: descriptor.instructions.clone(),
        model: descriptor.model.name.clone(),
        temperature: descriptor.model.temperature,
        max_tokens: descriptor.model.max_tokens,
        input: request.input.clone(),
        context: request.context.clone(),
        step_budget: request.step_budget.unwrap_or(DEFAULT_STEP_BUDGET),
        capabilities: handle.capabilities(),
        memory: session.map(|s| s as Arc<dyn ConversationMemory>),
    }
}

/// Forward runner units until the stream ends, the runner fails, or the
/// consumer goes away. Sends the terminal chunk itself except on timeout,
/// which cancels this future before any terminal send.
async fn produce(
    runner: Arc<dyn ModelRunner>,
    call: ModelCall,
    session: Option<Arc<SessionHandle>>,
    tx: mpsc::Sender<StreamChunk>,
    agent_id: String,
) {
    let started = Instant::now();
    let input = call.input.clone();

    if let Some(session) = &session {
        if let Err(e) = session.append(Turn::user(&input)).await {
            let _ = tx
                .send(StreamChunk::Error {
                    agent_id,
                    message: format!("session storage failed: {e}"),
                })
                .await;
            return;
        }
    }

    let mut stream = match runner.run_streamed(call).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx
                .send(StreamChunk::Error {
                    agent_id,
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    let mut collected = String::new();
    let mut token_count: u64 = 0;
    let mut usage: Option<Usage> = None;

    while let Some(unit) = stream.next().await {
        match unit {
            Ok(IncrementalUnit::Token(text)) => {
                collected.push_str(&text);
                token_count += 1;
                if tx.send(StreamChunk::Token { text }).await.is_err() {
                    debug!(agent_id = %agent_id, "Consumer disconnected; stopping stream");
                    return;
                }
            }
            Ok(IncrementalUnit::Step(entry)) => {
                if tx.send(StreamChunk::Step { entry }).await.is_err() {
                    debug!(agent_id = %agent_id, "Consumer disconnected; stopping stream");
                    return;
                }
            }
            Ok(IncrementalUnit::Usage(reported)) => usage = Some(reported),
            Err(e) => {
                let _ = tx
                    .send(StreamChunk::Error {
                        agent_id,
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        }
    }

    if let Some(session) = &session {
        if let Err(e) = session.append(Turn::assistant(&collected)).await {
            warn!(agent_id = %agent_id, error = %e, "Failed to persist assistant turn");
        }
    }

    let usage = usage.unwrap_or(Usage {
        input_tokens: 0,
        output_tokens: token_count,
        latency_ms: started.elapsed().as_millis() as u64,
    });
    let _ = tx.send(StreamChunk::Done { usage }).await;
}
