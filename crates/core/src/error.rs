//! Error types for the markwright domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all markwright operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion service errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Structured result errors ---
    #[error("Result schema error: {0}")]
    Schema(#[from] SchemaError),

    // --- Scheduler errors ---
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reaching the completion service. Never retried inside the core.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Tool-level faults. These are absorbed into the conversation as
/// error-content tool messages, except for registration errors.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("malformed arguments for tool '{tool_name}': {reason}")]
    MalformedArguments { tool_name: String, reason: String },

    #[error("invalid arguments for tool '{tool_name}': {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("tool '{tool_name}' failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("tool '{0}' is already registered")]
    DuplicateName(String),

    #[error("tool '{tool_name}' has an invalid parameter schema: {reason}")]
    InvalidSchema { tool_name: String, reason: String },
}

/// Structured-result failures. Fatal for the job that produced them.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("invalid JSON schema: {0}")]
    InvalidSchema(String),

    #[error("final answer is not valid JSON: {reason}")]
    MalformedJson { reason: String, content: String },

    #[error("final answer violates the result schema: {message}")]
    Validation {
        message: String,
        actual: serde_json::Value,
    },
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("pending queue is full ({capacity} jobs waiting)")]
    Full { capacity: usize },

    #[error("job '{job_id}' panicked: {reason}")]
    Panicked { job_id: String, reason: String },

    #[error("job '{job_id}' was dropped before it settled")]
    Abandoned { job_id: String },
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transcript not found: {0}")]
    NotFound(String),
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::MalformedArguments {
            tool_name: "rubric_lookup".into(),
            reason: "EOF while parsing".into(),
        };
        assert!(err.to_string().contains("rubric_lookup"));
        assert!(err.to_string().contains("EOF"));
    }

    #[test]
    fn schema_error_wraps_into_top_level() {
        let err: Error = SchemaError::Validation {
            message: "-1 is less than the minimum of 0".into(),
            actual: serde_json::json!({"recommendedPoints": -1}),
        }
        .into();
        assert!(matches!(err, Error::Schema(SchemaError::Validation { .. })));
        assert!(err.to_string().contains("minimum"));
    }

    #[test]
    fn panic_message_reads_str_and_string() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
