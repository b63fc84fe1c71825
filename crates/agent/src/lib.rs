//! The reasoning loop: a tool-augmented conversation with the completion
//! service that ends in a schema-validated result.
//!
//! A run follows an **Explore → Execute tools → Finalize** cycle:
//!
//! 1. **Explore**: send the conversation and tool declarations to the provider
//! 2. **Execute tools**: run every requested call concurrently, append the
//!    results in call order, loop back to step 1
//! 3. **Finalize**: once the model stops calling tools (or the round budget is
//!    spent), ask for the final answer and validate it against the result
//!    schema
//!
//! Tool faults are fed back to the model as error content. Transport errors
//! and schema violations fail the run.

pub mod executor;
pub mod grading;
pub mod loop_runner;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use executor::execute_round;
pub use grading::{Attachment, GradeRecommendation, recommendation_schema, submission_message};
pub use loop_runner::{LoopState, ReasoningLoop, RunOutcome, RunRequest};
pub use stream_event::{LoopEvent, RunStream};
