//! Tool trait and registry: the capabilities a reasoning run may call.
//!
//! The registry owns the invocation path for a single [`ToolCall`]:
//! lookup → argument parse → schema validation → invoke. Every failure along
//! that path becomes error content for the model instead of an `Err`, so one
//! bad call degrades the conversation rather than aborting the job.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{SchemaError, ToolError, panic_message};
use crate::message::{Message, ToolCall};
use crate::provider::ToolDefinition;
use crate::schema::JsonSchema;

/// The core Tool trait.
///
/// Implementations receive parameters that already passed
/// [`parameters_schema`](Tool::parameters_schema) validation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool.
    fn name(&self) -> &str;

    /// What this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool on validated parameters.
    async fn invoke(&self, params: Value) -> Result<Value, ToolError>;

    /// Convert this tool into a declaration for the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A [`Tool`] backed by an async closure. Build one with [`tool_fn`].
pub struct FnTool<F> {
    name: String,
    description: String,
    parameters: Value,
    handler: F,
}

/// Create a tool from a name, description, parameter schema and async closure.
pub fn tool_fn<F, Fut>(
    name: impl Into<String>,
    description: impl Into<String>,
    parameters: Value,
    handler: F,
) -> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    FnTool {
        name: name.into(),
        description: description.into(),
        parameters,
        handler,
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        (self.handler)(params).await
    }
}

/// What one tool call produced, success or error content.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    /// The `tool` message answering the originating call.
    pub fn into_message(self) -> Message {
        Message::tool_result(self.call_id, self.content)
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    schema: JsonSchema,
}

/// A registry of available tools, keyed by unique name.
///
/// Shared read-only (behind an `Arc`) by every reasoning run it is handed to.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, compiling its parameter schema.
    ///
    /// Names must be unique; a second tool with the same name is rejected.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<&mut Self, ToolError> {
        self.register_shared(Arc::new(tool))
    }

    /// Register a tool that is already shared elsewhere.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) -> Result<&mut Self, ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        let schema = JsonSchema::new(tool.parameters_schema()).map_err(|e| {
            ToolError::InvalidSchema {
                tool_name: name.clone(),
                reason: e.to_string(),
            }
        })?;
        self.tools.insert(name, RegisteredTool { tool, schema });
        Ok(self)
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.tool.as_ref())
    }

    /// All tool declarations, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.tool.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one tool call end to end. Never fails; faults become error content.
    pub async fn invoke(&self, call: &ToolCall) -> ToolOutcome {
        match self.try_invoke(call).await {
            Ok(output) => {
                debug!(tool = %call.name, call_id = %call.id, "Tool call succeeded");
                ToolOutcome {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: render_output(output),
                    is_error: false,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                ToolOutcome {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: format!("Error: {e}"),
                    is_error: true,
                }
            }
        }
    }

    async fn try_invoke(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let entry = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let params = parse_arguments(call)?;

        entry.schema.validate(&params).map_err(|e| ToolError::InvalidArguments {
            tool_name: call.name.clone(),
            reason: match e {
                SchemaError::Validation { message, .. } => message,
                other => other.to_string(),
            },
        })?;

        match AssertUnwindSafe(entry.tool.invoke(params)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: format!("panicked: {}", panic_message(&*panic)),
            }),
        }
    }
}

/// Parse serialized call arguments. An empty payload means "no arguments".
fn parse_arguments(call: &ToolCall) -> Result<Value, ToolError> {
    if call.arguments.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(&call.arguments).map_err(|e| ToolError::MalformedArguments {
        tool_name: call.name.clone(),
        reason: format!("{e} (payload: {})", call.arguments),
    })
}

fn render_output(output: Value) -> String {
    match output {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
