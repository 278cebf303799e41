//! Vendor bindings.
//!
//! Each binding implements both `IndexService` and `AssistantService`.

pub mod memory;
pub mod openai;

pub use memory::{FailurePlan, InMemoryBackend, NO_MATCH_ANSWER};
pub use openai::OpenAiClient;
