//! Transcript persistence: the boundary to whatever stores finished runs.
//!
//! The core only produces [`Transcript`]s; where they live is up to the
//! application. [`InMemoryTranscriptStore`] serves tests and ephemeral use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::message::{ConversationId, Message};

/// A finished reasoning run, keyed by conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub key: ConversationId,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub saved_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new(
        key: ConversationId,
        messages: Vec<Message>,
        result: Option<serde_json::Value>,
    ) -> Self {
        Self {
            key,
            messages,
            result,
            saved_at: Utc::now(),
        }
    }
}

/// The persistence collaborator.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    fn name(&self) -> &str;

    /// Store a transcript, replacing any previous one with the same key.
    async fn save(&self, transcript: Transcript) -> Result<(), StoreError>;

    /// Load the transcript stored under `key`, if any.
    async fn load(&self, key: &ConversationId) -> Result<Option<Transcript>, StoreError>;
}

/// Keeps transcripts in a map. Nothing survives the process.
pub struct InMemoryTranscriptStore {
    transcripts: Arc<RwLock<HashMap<ConversationId, Transcript>>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self {
            transcripts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.transcripts.read().await.len()
    }
}

impl Default for InMemoryTranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    fn name(&self) -> &str { "in_memory" }

    async fn save(&self, transcript: Transcript) -> Result<(), StoreError> {
        self.transcripts
            .write()
            .await
            .insert(transcript.key.clone(), transcript);
        Ok(())
    }

    async fn load(&self, key: &ConversationId) -> Result<Option<Transcript>, StoreError> {
        Ok(self.transcripts.read().await.get(key).cloned())
    }
}
