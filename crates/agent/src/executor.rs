//! Scatter/gather execution of one round of tool calls.

use futures::future::join_all;
use markwright_core::message::{Message, ToolCall};
use markwright_core::tool::ToolRegistry;

/// Invoke every call of a round concurrently and return one tool message per
/// call, in call order regardless of completion order.
///
/// With no registry every call resolves to "not found" error content.
pub async fn execute_round(registry: Option<&ToolRegistry>, calls: &[ToolCall]) -> Vec<Message> {
    let empty;
    let registry = match registry {
        Some(registry) => registry,
        None => {
            empty = ToolRegistry::new();
            &empty
        }
    };

    join_all(calls.iter().map(|call| registry.invoke(call)))
        .await
        .into_iter()
        .map(|outcome| outcome.into_message())
        .collect()
}
