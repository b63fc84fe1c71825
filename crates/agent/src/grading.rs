//! Grading-specific building blocks: the recommendation result type, its
//! schema, and the user message that carries a submission.

use markwright_core::error::SchemaError;
use markwright_core::message::{ContentPart, Message};
use markwright_core::schema::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// The structured answer of a grading run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecommendation {
    pub recommended_points: f64,
    pub feedback: String,
}

/// Schema for a [`GradeRecommendation`] between 0 and `max_points`.
pub fn recommendation_schema(max_points: f64) -> Result<JsonSchema, SchemaError> {
    let raw = json!({
        "type": "object",
        "properties": {
            "recommendedPoints": {
                "type": "number",
                "minimum": 0,
                "maximum": max_points
            },
            "feedback": { "type": "string" }
        },
        "required": ["recommendedPoints", "feedback"],
        "additionalProperties": false
    });
    JsonSchema::new(raw)
}

/// An image attached to a submission (e.g. a scanned answer sheet).
#[derive(Debug, Clone)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// The user message presenting a submission: text first, then images inline.
pub fn submission_message(text: impl Into<String>, attachments: &[Attachment]) -> Message {
    if attachments.is_empty() {
        return Message::user(text.into());
    }
    let mut parts = vec![ContentPart::text(text)];
    parts.extend(
        attachments
            .iter()
            .map(|a| ContentPart::image(&a.bytes, a.media_type.clone())),
    );
    Message::user(parts)
}
