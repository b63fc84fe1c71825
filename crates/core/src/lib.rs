//! # markwright core
//!
//! Domain types, traits, and error definitions for the markwright grading
//! orchestration core. Every other crate depends inward on this one.
//!
//! ## Contents
//!
//! - [`message`]: conversation messages, content parts, tool calls
//! - [`provider`]: the completion-service trait
//! - [`tool`]: the tool trait, registry, and single-call invoker
//! - [`schema`]: compiled JSON Schema validation
//! - [`store`]: the transcript persistence boundary
//! - [`error`]: one error enum per bounded context

pub mod error;
pub mod message;
pub mod provider;
pub mod schema;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{ContentPart, ConversationId, Message, MessageContent, Role, ToolCall};
pub use provider::{CompletionRequest, CompletionResponse, Provider, ToolDefinition, Usage};
pub use schema::JsonSchema;
pub use store::{InMemoryTranscriptStore, Transcript, TranscriptStore};
pub use tool::{Tool, ToolOutcome, ToolRegistry, tool_fn};
