//! Compiled JSON Schema wrapper.
//!
//! Tool parameter schemas and caller-supplied result schemas are compiled
//! once with the `jsonschema` crate and shared behind an `Arc`.

use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::SchemaError;

/// A JSON Schema together with its compiled validator.
#[derive(Clone)]
pub struct JsonSchema {
    raw: Value,
    validator: Arc<jsonschema::Validator>,
}

impl JsonSchema {
    /// Compile a schema. Fails if `raw` is not a valid JSON Schema document.
    pub fn new(raw: Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(&raw)
            .map_err(|e| SchemaError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            raw,
            validator: Arc::new(validator),
        })
    }

    /// The schema document as supplied.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Validate `instance`, joining every violation into one message.
    pub fn validate(&self, instance: &Value) -> Result<(), SchemaError> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Validation {
                message: errors.join("; "),
                actual: instance.clone(),
            })
        }
    }
}

impl std::fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("JsonSchema").field(&self.raw).finish()
    }
}

impl PartialEq for JsonSchema {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Serialize for JsonSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}
