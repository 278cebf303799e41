//! Vendor-neutral types shared by every binding.
//!
//! Bindings translate their wire formats into these types so that the
//! store crate never sees a vendor payload.

use serde::{Deserialize, Serialize};

/// A hosted retrieval index (vendor "vector store").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Opaque vendor id
    pub id: String,

    /// Human-chosen display name; the vendor allows it to be absent
    pub name: Option<String>,

    /// Number of documents currently attached
    #[serde(default)]
    pub document_count: u64,

    /// Vendor status string (e.g. "completed", "in_progress", "expired")
    #[serde(default)]
    pub status: String,

    /// Creation time, seconds since the Unix epoch
    #[serde(default)]
    pub created_at: i64,
}

impl IndexSummary {
    /// Name for display, falling back to the id when unnamed.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Ingestion state of one document inside an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum IngestionStatus {
    InProgress,
    Completed,
    Failed(String),
    Cancelled,
}

impl IngestionStatus {
    /// Whether the ingestion job has stopped.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// A document attached to an index. The id doubles as the blob (file) id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub status: IngestionStatus,
}

/// Cached reference to a remote assistant whose retrieval tool points at one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantHandle {
    pub assistant_id: String,
    pub index_id: String,
}

/// Parameters for creating an assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
}

impl AssistantSpec {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: model.into(),
        }
    }
}

/// A started conversational run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRef {
    pub thread_id: String,
    pub run_id: String,
}

/// State of a conversational run as seen by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Still queued or running; carries the vendor status
    Pending(String),

    /// Finished successfully
    Completed,

    /// Reached a terminal state other than success
    Failed { status: String, reason: String },
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Cursor to pass as `after` for the next page, when more remain
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A page with no successor.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}
