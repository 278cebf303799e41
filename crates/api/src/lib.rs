//! Vendor integration crate for vsctl.
//!
//! This crate provides a vendor-agnostic abstraction over a hosted
//! retrieval index ("vector store") service and its managed
//! retrieval-augmented conversation flow.
//!
//! # Providers
//! - **OpenAI**: vector stores, files and assistants over REST (default)
//! - **Memory**: in-process sandbox used by tests and dry runs
//!
//! # Example
//! ```no_run
//! use vsctl_api::{create_backend, IndexService};
//! use vsctl_core::Credential;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credential = Credential::new("sk-...")?;
//! let backend = create_backend("openai", None, &credential)?;
//! let page = backend.indexes.list_indexes(None).await?;
//! for index in page.items {
//!     println!("{} {}", index.display_name(), index.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{AssistantService, IndexService};
pub use factory::{create_backend, Backend, ProviderType};
pub use providers::{FailurePlan, InMemoryBackend, OpenAiClient, NO_MATCH_ANSWER};
pub use types::{
    AssistantHandle, AssistantSpec, DocumentRef, IndexSummary, IngestionStatus, Page, RunRef,
    RunStatus,
};
