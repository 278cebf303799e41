//! Vendor service abstractions.
//!
//! The overwrite coordinator, the query runner and the credential validator
//! depend only on these traits. Each binding (OpenAI REST, in-memory sandbox)
//! implements both.

use crate::types::{
    AssistantHandle, AssistantSpec, DocumentRef, IndexSummary, IngestionStatus, Page, RunRef,
    RunStatus,
};
use vsctl_core::AppResult;

/// Index (vector store) and document management.
#[async_trait::async_trait]
pub trait IndexService: Send + Sync {
    /// Get the provider name (e.g., "openai", "memory").
    fn provider_name(&self) -> &str;

    /// Cheapest read-only call that proves the credential works.
    ///
    /// Must not mutate remote state.
    async fn probe(&self) -> AppResult<()>;

    /// List one page of indexes, starting after `after` when given.
    async fn list_indexes(&self, after: Option<&str>) -> AppResult<Page<IndexSummary>>;

    /// Fetch one index. Fails with `IndexNotFound` when it does not exist.
    async fn get_index(&self, index_id: &str) -> AppResult<IndexSummary>;

    /// Create an empty index.
    async fn create_index(&self, name: Option<&str>) -> AppResult<IndexSummary>;

    /// Delete an index. Its documents' blobs are not touched.
    async fn delete_index(&self, index_id: &str) -> AppResult<()>;

    /// List one page of documents attached to an index.
    async fn list_documents(
        &self,
        index_id: &str,
        after: Option<&str>,
    ) -> AppResult<Page<DocumentRef>>;

    /// Remove a document from an index, leaving its blob in file storage.
    async fn detach_document(&self, index_id: &str, document_id: &str) -> AppResult<()>;

    /// Delete a blob from account-wide file storage.
    async fn delete_blob(&self, blob_id: &str) -> AppResult<()>;

    /// Store a blob in account-wide file storage and return its id.
    async fn upload_blob(&self, file_name: &str, content: Vec<u8>) -> AppResult<String>;

    /// Attach a stored blob to an index, which starts ingestion.
    async fn attach_document(&self, index_id: &str, blob_id: &str) -> AppResult<DocumentRef>;

    /// Current ingestion state of an attached document.
    async fn document_status(&self, index_id: &str, document_id: &str)
        -> AppResult<IngestionStatus>;
}

/// Managed retrieval-augmented conversation.
#[async_trait::async_trait]
pub trait AssistantService: Send + Sync {
    /// Create an assistant whose retrieval tool searches `index_id`.
    async fn create_assistant(
        &self,
        spec: &AssistantSpec,
        index_id: &str,
    ) -> AppResult<AssistantHandle>;

    /// Point an existing assistant's retrieval tool at `index_id`.
    async fn bind_assistant(&self, assistant_id: &str, index_id: &str) -> AppResult<()>;

    /// Open a thread, post `question` as the user and start a run.
    async fn start_run(&self, assistant_id: &str, question: &str) -> AppResult<RunRef>;

    /// Poll a run once.
    async fn run_status(&self, run: &RunRef) -> AppResult<RunStatus>;

    /// Text of the newest assistant message in a thread, if any.
    async fn latest_answer(&self, thread_id: &str) -> AppResult<Option<String>>;
}
