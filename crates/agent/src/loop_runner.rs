//! The reasoning loop implementation.

use markwright_config::ReasoningConfig;
use markwright_core::error::SchemaError;
use markwright_core::message::{ConversationId, Message};
use markwright_core::provider::{CompletionRequest, Provider, ToolDefinition, Usage};
use markwright_core::schema::JsonSchema;
use markwright_core::tool::ToolRegistry;
use markwright_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::executor::execute_round;
use crate::stream_event::{LoopEvent, RunStream};

/// Instruction for the finalization round of a run without a result schema.
const PLAIN_FINALIZE_INSTRUCTION: &str = "Based on everything above, give your final answer now.";

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Exploring,
    ExecutingTools,
    Finalizing,
    Done,
    Failed,
}

/// Everything one run needs besides the loop's own settings.
#[derive(Clone)]
pub struct RunRequest {
    /// Seed conversation (system prompt, submission, rubric, ...)
    pub messages: Vec<Message>,

    /// Tools the model may call; `None` means no tools are declared
    pub tools: Option<Arc<ToolRegistry>>,

    /// Schema the final answer must satisfy
    pub result_schema: Option<JsonSchema>,

    /// Overrides the loop's default temperature
    pub temperature: Option<f32>,

    /// Correlates log lines of one run
    pub conversation_id: ConversationId,
}

impl RunRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: None,
            result_schema: None,
            temperature: None,
            conversation_id: ConversationId::new(),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_result_schema(mut self, schema: JsonSchema) -> Self {
        self.result_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_conversation_id(mut self, id: ConversationId) -> Self {
        self.conversation_id = id;
        self
    }
}

/// A finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// The structured result (schema-validated when a schema was given)
    pub result: Value,

    /// The full conversation, seed messages included
    pub messages: Vec<Message>,

    /// Completed tool rounds
    pub rounds: u32,

    /// Whether finalization was forced by the round budget
    pub budget_exhausted: bool,

    /// Token usage summed over every completion call
    pub usage: Usage,
}

/// Accumulator carried through the loop.
struct RunState {
    messages: Vec<Message>,
    rounds: u32,
    budget_exhausted: bool,
    usage: Usage,
    events: Option<mpsc::Sender<LoopEvent>>,
}

impl RunState {
    async fn push(&mut self, message: Message) {
        if let Some(events) = &self.events {
            // A consumer that stopped listening does not stop the run.
            let _ = events
                .send(LoopEvent::Message {
                    message: message.clone(),
                })
                .await;
        }
        self.messages.push(message);
    }
}

/// Drives a tool-augmented conversation until it produces a final answer.
///
/// Each run explores (model turn, then all requested tool calls) for at most
/// `max_rounds` tool rounds, then finalizes. With a result schema the final
/// answer must be JSON satisfying it; a violation fails the run.
#[derive(Clone)]
pub struct ReasoningLoop {
    /// The completion service
    provider: Arc<dyn Provider>,

    /// Tool rounds allowed before finalization is forced
    max_rounds: u32,

    /// Default temperature
    temperature: Option<f32>,

    /// Default max tokens per completion
    max_tokens: Option<u32>,

    /// Prefix of the finalization instruction; the schema is appended
    finalize_instruction: String,
}

impl ReasoningLoop {
    /// Create a loop with default settings.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self::from_config(provider, &ReasoningConfig::default())
    }

    /// Create a loop from the `[reasoning]` config section.
    pub fn from_config(provider: Arc<dyn Provider>, config: &ReasoningConfig) -> Self {
        Self {
            provider,
            max_rounds: config.max_rounds,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            finalize_instruction: config.finalize_instruction.clone(),
        }
    }

    /// Set the tool round budget.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_finalize_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.finalize_instruction = instruction.into();
        self
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Run to completion.
    ///
    /// Tool faults never fail the run; they reach the model as error content.
    /// A completion-service error or a final answer that is not valid JSON
    /// for the result schema does.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        self.drive(request, None).await
    }

    /// Run to completion and deserialize the result into `T`.
    pub async fn run_as<T: DeserializeOwned>(
        &self,
        request: RunRequest,
    ) -> Result<(T, RunOutcome)> {
        let outcome = self.run(request).await?;
        let typed = serde_json::from_value(outcome.result.clone())?;
        Ok((typed, outcome))
    }

    /// Run on a spawned task, streaming every appended message.
    ///
    /// The events end with exactly one [`LoopEvent::Finished`] or
    /// [`LoopEvent::Failed`]; [`RunStream::finish`] yields the typed result.
    pub fn run_stream(&self, request: RunRequest) -> RunStream {
        let (tx, rx) = mpsc::channel(64);
        let this = self.clone();
        let task = tokio::spawn(async move {
            let result = this.drive(request, Some(tx.clone())).await;
            let last = match &result {
                Ok(outcome) => LoopEvent::Finished {
                    outcome: outcome.clone(),
                },
                Err(e) => LoopEvent::Failed {
                    error: e.to_string(),
                },
            };
            let _ = tx.send(last).await;
            result
        });
        RunStream::new(rx, task)
    }

    async fn drive(
        &self,
        request: RunRequest,
        events: Option<mpsc::Sender<LoopEvent>>,
    ) -> Result<RunOutcome> {
        info!(
            conversation_id = %request.conversation_id,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, |t| t.len()),
            structured = request.result_schema.is_some(),
            "Reasoning run started"
        );

        let mut run = RunState {
            messages: request.messages.clone(),
            rounds: 0,
            budget_exhausted: false,
            usage: Usage::default(),
            events,
        };

        match self.explore(&request, &mut run).await {
            Ok(result) => {
                info!(
                    conversation_id = %request.conversation_id,
                    state = ?LoopState::Done,
                    rounds = run.rounds,
                    budget_exhausted = run.budget_exhausted,
                    tokens = run.usage.total_tokens,
                    "Reasoning run finished"
                );
                Ok(RunOutcome {
                    result,
                    messages: run.messages,
                    rounds: run.rounds,
                    budget_exhausted: run.budget_exhausted,
                    usage: run.usage,
                })
            }
            Err(e) => {
                warn!(
                    conversation_id = %request.conversation_id,
                    state = ?LoopState::Failed,
                    rounds = run.rounds,
                    error = %e,
                    "Reasoning run failed"
                );
                Err(e)
            }
        }
    }

    /// The Exploring / ExecutingTools cycle, ending in finalization.
    async fn explore(&self, request: &RunRequest, run: &mut RunState) -> Result<Value> {
        let definitions = request
            .tools
            .as_ref()
            .map(|t| t.definitions())
            .unwrap_or_default();
        let mut state = LoopState::Exploring;

        loop {
            state = match state {
                LoopState::Exploring if run.rounds >= self.max_rounds => {
                    warn!(
                        conversation_id = %request.conversation_id,
                        rounds = run.rounds,
                        "Round budget exhausted, forcing finalization"
                    );
                    run.budget_exhausted = true;
                    LoopState::Finalizing
                }
                LoopState::Exploring => {
                    debug!(
                        conversation_id = %request.conversation_id,
                        round = run.rounds + 1,
                        "Exploration round"
                    );
                    let message = self
                        .complete(run, definitions.clone(), None, request.temperature)
                        .await?;
                    let next = if message.has_tool_calls() {
                        LoopState::ExecutingTools
                    } else {
                        LoopState::Finalizing
                    };
                    run.push(message).await;
                    next
                }
                LoopState::ExecutingTools => {
                    let calls = run
                        .messages
                        .last()
                        .map(|m| m.tool_calls.clone())
                        .unwrap_or_default();
                    debug!(
                        conversation_id = %request.conversation_id,
                        round = run.rounds + 1,
                        calls = calls.len(),
                        "Executing tool calls"
                    );
                    for message in execute_round(request.tools.as_deref(), &calls).await {
                        run.push(message).await;
                    }
                    run.rounds += 1;
                    LoopState::Exploring
                }
                LoopState::Finalizing => return self.finalize(request, run).await,
                LoopState::Done | LoopState::Failed => {
                    return Err(Error::Internal(format!(
                        "reasoning loop entered terminal state {state:?} without a result"
                    )));
                }
            };
        }
    }

    async fn finalize(&self, request: &RunRequest, run: &mut RunState) -> Result<Value> {
        match &request.result_schema {
            Some(schema) => {
                let instruction = format!(
                    "{}\n\n{}",
                    self.finalize_instruction,
                    serde_json::to_string_pretty(schema.as_value())?
                );
                run.push(Message::user(instruction)).await;

                let response_schema = Some(schema.as_value().clone());
                let message = self
                    .complete(run, Vec::new(), response_schema, request.temperature)
                    .await?;
                let text = message.text();
                run.push(message).await;

                let value = parse_structured(&text)?;
                schema.validate(&value)?;
                Ok(value)
            }
            None => {
                run.push(Message::user(PLAIN_FINALIZE_INSTRUCTION)).await;
                let message = self.complete(run, Vec::new(), None, request.temperature).await?;
                let text = message.text();
                run.push(message).await;
                Ok(Value::String(text))
            }
        }
    }

    /// One completion call over the accumulated conversation.
    async fn complete(
        &self,
        run: &mut RunState,
        tools: Vec<ToolDefinition>,
        response_schema: Option<Value>,
        temperature: Option<f32>,
    ) -> Result<Message> {
        let request = CompletionRequest {
            messages: run.messages.clone(),
            tools,
            response_schema,
            temperature: temperature.or(self.temperature),
            max_tokens: self.max_tokens,
        };

        let response = self.provider.complete(request).await.map_err(|e| {
            warn!(provider = self.provider.name(), error = %e, "Completion request failed");
            e
        })?;

        if let Some(usage) = &response.usage {
            run.usage.add(usage);
        }
        debug!(
            model = %response.model,
            tool_calls = response.message.tool_calls.len(),
            "Completion received"
        );
        Ok(response.message)
    }
}

/// Parse a final answer, tolerating a surrounding markdown code fence.
fn parse_structured(text: &str) -> std::result::Result<Value, SchemaError> {
    serde_json::from_str(strip_code_fence(text.trim())).map_err(|e| SchemaError::MalformedJson {
        reason: e.to_string(),
        content: text.to_string(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}
