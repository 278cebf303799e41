//! In-memory vendor backend.
//!
//! Implements both service traits against process-local state so the
//! overwrite protocol and the query flow can be exercised without network
//! access. Failures can be injected per operation, and every mutating call
//! is recorded so tests can assert on ordering.

use crate::client::{AssistantService, IndexService};
use crate::types::{
    AssistantHandle, AssistantSpec, DocumentRef, IndexSummary, IngestionStatus, Page, RunRef,
    RunStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use vsctl_core::{AppError, AppResult, Credential};

/// Answer returned when no stored line matches the question.
pub const NO_MATCH_ANSWER: &str = "I could not find this information in the available documents.";

/// Operations that should fail on the next calls.
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// Reject every index deletion
    pub delete_index: bool,

    /// Reject every index creation
    pub create_index: bool,

    /// Document ids whose detach is rejected
    pub detach: HashSet<String>,

    /// Blob ids whose deletion is rejected
    pub delete_blob: HashSet<String>,

    /// Reject the attach call itself (content uploaded, never attached)
    pub attach: bool,

    /// Make every ingestion job end as failed with this reason
    pub ingestion: Option<String>,

    /// Reject assistant rebinding
    pub bind_assistant: bool,

    /// Make every run end as failed with this reason
    pub run: Option<String>,

    /// Keep every run pending forever
    pub stall_runs: bool,
}

#[derive(Debug)]
struct Document {
    id: String,
    polls_remaining: u32,
    outcome: IngestionStatus,
}

#[derive(Debug)]
struct Store {
    id: String,
    name: Option<String>,
    created_at: i64,
    documents: Vec<Document>,
}

#[derive(Debug)]
struct Blob {
    file_name: String,
    content: String,
}

#[derive(Debug)]
struct Assistant {
    spec: AssistantSpec,
    index_id: String,
}

#[derive(Debug)]
struct Run {
    thread_id: String,
    polls_remaining: u32,
    outcome: RunStatus,
    answer: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    expected_credential: Option<String>,
    page_size: usize,
    ingestion_polls: u32,
    run_polls: u32,
    stores: Vec<Store>,
    blobs: HashMap<String, Blob>,
    assistants: HashMap<String, Assistant>,
    runs: HashMap<String, Run>,
    answers: HashMap<String, String>,
    failures: FailurePlan,
    calls: Vec<String>,
}

impl State {
    fn store(&self, index_id: &str) -> AppResult<&Store> {
        self.stores
            .iter()
            .find(|store| store.id == index_id)
            .ok_or_else(|| AppError::IndexNotFound(index_id.to_string()))
    }

    fn store_mut(&mut self, index_id: &str) -> AppResult<&mut Store> {
        self.stores
            .iter_mut()
            .find(|store| store.id == index_id)
            .ok_or_else(|| AppError::IndexNotFound(index_id.to_string()))
    }

    fn summary(store: &Store) -> IndexSummary {
        IndexSummary {
            id: store.id.clone(),
            name: store.name.clone(),
            document_count: store.documents.len() as u64,
            status: "completed".to_string(),
            created_at: store.created_at,
        }
    }

    fn page<T: Clone>(
        &self,
        items: &[T],
        id_of: impl Fn(&T) -> &str,
        after: Option<&str>,
    ) -> Page<T> {
        let start = match after {
            Some(cursor) => items
                .iter()
                .position(|item| id_of(item) == cursor)
                .map(|pos| pos + 1)
                .unwrap_or(items.len()),
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        let slice = items.get(start..end).unwrap_or_default().to_vec();
        let next_cursor = if end < items.len() {
            slice.last().map(|item| id_of(item).to_string())
        } else {
            None
        };
        Page {
            items: slice,
            next_cursor,
        }
    }

    /// Lines of completed documents in `index_id` that share a word with `question`.
    fn grounded_answer(&self, index_id: &str, question: &str) -> AppResult<String> {
        let store = self.store(index_id)?;
        let terms: Vec<String> = question
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|term| term.chars().count() > 2)
            .map(str::to_lowercase)
            .collect();

        let lines: Vec<&str> = store
            .documents
            .iter()
            .filter(|document| {
                document.polls_remaining == 0 && document.outcome == IngestionStatus::Completed
            })
            .filter_map(|document| self.blobs.get(&document.id))
            .flat_map(|blob| blob.content.lines())
            .filter(|line| {
                let lower = line.to_lowercase();
                terms.iter().any(|term| lower.contains(term.as_str()))
            })
            .collect();

        if lines.is_empty() {
            Ok(NO_MATCH_ANSWER.to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }
}

fn new_id(prefix: &str) -> String {
    format!("{}{}", prefix, uuid::Uuid::new_v4().simple())
}

fn injected(operation: &str) -> AppError {
    AppError::api(Some(500), format!("{}: injected failure", operation))
}

/// Process-local vendor sandbox. Clones share state.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
    presented_credential: Option<String>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Create an empty sandbox that accepts any credential.
    pub fn new() -> Self {
        let state = State {
            page_size: 100,
            ingestion_polls: 1,
            run_polls: 1,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            presented_credential: None,
        }
    }

    /// Only accept calls made through `connect` with this credential.
    pub fn require_credential(self, credential: &str) -> Self {
        self.state().expected_credential = Some(credential.to_string());
        self
    }

    /// Page size for listings.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state().page_size = page_size.max(1);
        self
    }

    /// Number of status polls before ingestion and runs reach their outcome.
    pub fn with_poll_delays(self, ingestion_polls: u32, run_polls: u32) -> Self {
        {
            let mut state = self.state();
            state.ingestion_polls = ingestion_polls;
            state.run_polls = run_polls;
        }
        self
    }

    /// A view of the same sandbox that presents `credential` on every call.
    pub fn connect(&self, credential: &Credential) -> Self {
        Self {
            state: Arc::clone(&self.state),
            presented_credential: Some(credential.expose().to_string()),
        }
    }

    /// Replace the failure plan.
    pub fn set_failures(&self, failures: FailurePlan) {
        self.state().failures = failures;
    }

    /// Create an index whose documents are already ingested; returns its id.
    pub fn seed_index(&self, name: &str, documents: &[&str]) -> String {
        let mut state = self.state();
        let index_id = new_id("vs_");
        let mut attached = Vec::new();
        for (position, content) in documents.iter().enumerate() {
            let blob_id = new_id("file-");
            state.blobs.insert(
                blob_id.clone(),
                Blob {
                    file_name: format!("{}-{}.txt", name, position),
                    content: content.to_string(),
                },
            );
            attached.push(Document {
                id: blob_id,
                polls_remaining: 0,
                outcome: IngestionStatus::Completed,
            });
        }
        state.stores.push(Store {
            id: index_id.clone(),
            name: Some(name.to_string()),
            created_at: chrono::Utc::now().timestamp(),
            documents: attached,
        });
        index_id
    }

    /// Contents of every document attached to an index, in attach order.
    pub fn index_contents(&self, index_id: &str) -> AppResult<Vec<String>> {
        let state = self.state();
        let store = state.store(index_id)?;
        Ok(store
            .documents
            .iter()
            .filter_map(|document| state.blobs.get(&document.id))
            .map(|blob| blob.content.clone())
            .collect())
    }

    /// Ids of the documents attached to an index.
    pub fn document_ids(&self, index_id: &str) -> AppResult<Vec<String>> {
        let state = self.state();
        Ok(state
            .store(index_id)?
            .documents
            .iter()
            .map(|document| document.id.clone())
            .collect())
    }

    /// File name a blob was uploaded with.
    pub fn blob_file_name(&self, blob_id: &str) -> Option<String> {
        self.state()
            .blobs
            .get(blob_id)
            .map(|blob| blob.file_name.clone())
    }

    pub fn blob_exists(&self, blob_id: &str) -> bool {
        self.state().blobs.contains_key(blob_id)
    }

    pub fn blob_count(&self) -> usize {
        self.state().blobs.len()
    }

    pub fn index_exists(&self, index_id: &str) -> bool {
        self.state().store(index_id).is_ok()
    }

    /// Index an assistant's retrieval tool currently points at.
    pub fn assistant_binding(&self, assistant_id: &str) -> Option<String> {
        self.state()
            .assistants
            .get(assistant_id)
            .map(|assistant| assistant.index_id.clone())
    }

    pub fn assistant_count(&self) -> usize {
        self.state().assistants.len()
    }

    /// Mutating calls in the order they were made, e.g. `"detach:vs_1:file-2"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state after checking the presented credential.
    fn authorized(&self) -> AppResult<MutexGuard<'_, State>> {
        let state = self.state();
        if let Some(expected) = &state.expected_credential {
            if self.presented_credential.as_deref() != Some(expected.as_str()) {
                return Err(AppError::InvalidCredential(
                    "Incorrect API key provided".to_string(),
                ));
            }
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl IndexService for InMemoryBackend {
    fn provider_name(&self) -> &str {
        "memory"
    }

    async fn probe(&self) -> AppResult<()> {
        self.authorized().map(|_| ())
    }

    async fn list_indexes(&self, after: Option<&str>) -> AppResult<Page<IndexSummary>> {
        let state = self.authorized()?;
        let summaries: Vec<IndexSummary> = state.stores.iter().map(State::summary).collect();
        Ok(state.page(&summaries, |summary| summary.id.as_str(), after))
    }

    async fn get_index(&self, index_id: &str) -> AppResult<IndexSummary> {
        let state = self.authorized()?;
        state.store(index_id).map(State::summary)
    }

    async fn create_index(&self, name: Option<&str>) -> AppResult<IndexSummary> {
        let mut state = self.authorized()?;
        state
            .calls
            .push(format!("create_index:{}", name.unwrap_or("<unnamed>")));
        if state.failures.create_index {
            return Err(injected("create_index"));
        }

        let store = Store {
            id: new_id("vs_"),
            name: name.map(str::to_string),
            created_at: chrono::Utc::now().timestamp(),
            documents: Vec::new(),
        };
        let summary = State::summary(&store);
        state.stores.push(store);
        Ok(summary)
    }

    async fn delete_index(&self, index_id: &str) -> AppResult<()> {
        let mut state = self.authorized()?;
        state.calls.push(format!("delete_index:{}", index_id));
        state.store(index_id)?;
        if state.failures.delete_index {
            return Err(injected("delete_index"));
        }
        state.stores.retain(|store| store.id != index_id);
        Ok(())
    }

    async fn list_documents(
        &self,
        index_id: &str,
        after: Option<&str>,
    ) -> AppResult<Page<DocumentRef>> {
        let state = self.authorized()?;
        let documents: Vec<DocumentRef> = state
            .store(index_id)?
            .documents
            .iter()
            .map(|document| DocumentRef {
                id: document.id.clone(),
                status: if document.polls_remaining > 0 {
                    IngestionStatus::InProgress
                } else {
                    document.outcome.clone()
                },
            })
            .collect();
        Ok(state.page(&documents, |document| document.id.as_str(), after))
    }

    async fn detach_document(&self, index_id: &str, document_id: &str) -> AppResult<()> {
        let mut state = self.authorized()?;
        state
            .calls
            .push(format!("detach:{}:{}", index_id, document_id));
        if state.failures.detach.contains(document_id) {
            return Err(injected("detach_document"));
        }
        let store = state.store_mut(index_id)?;
        let before = store.documents.len();
        store.documents.retain(|document| document.id != document_id);
        if store.documents.len() == before {
            return Err(AppError::api(
                Some(404),
                format!("No file {} in vector store {}", document_id, index_id),
            ));
        }
        Ok(())
    }

    async fn delete_blob(&self, blob_id: &str) -> AppResult<()> {
        let mut state = self.authorized()?;
        state.calls.push(format!("delete_blob:{}", blob_id));
        if state.failures.delete_blob.contains(blob_id) {
            return Err(injected("delete_blob"));
        }
        state
            .blobs
            .remove(blob_id)
            .map(|_| ())
            .ok_or_else(|| AppError::api(Some(404), format!("No such file: {}", blob_id)))
    }

    async fn upload_blob(&self, file_name: &str, content: Vec<u8>) -> AppResult<String> {
        let mut state = self.authorized()?;
        state.calls.push(format!("upload_blob:{}", file_name));
        let content = String::from_utf8(content)
            .map_err(|e| AppError::api(Some(400), format!("File is not valid UTF-8: {}", e)))?;
        let blob_id = new_id("file-");
        state.blobs.insert(
            blob_id.clone(),
            Blob {
                file_name: file_name.to_string(),
                content,
            },
        );
        Ok(blob_id)
    }

    async fn attach_document(&self, index_id: &str, blob_id: &str) -> AppResult<DocumentRef> {
        let mut state = self.authorized()?;
        state.calls.push(format!("attach:{}:{}", index_id, blob_id));
        if state.failures.attach {
            return Err(injected("attach_document"));
        }
        if !state.blobs.contains_key(blob_id) {
            return Err(AppError::api(Some(404), format!("No such file: {}", blob_id)));
        }

        let polls_remaining = state.ingestion_polls;
        let outcome = match &state.failures.ingestion {
            Some(reason) => IngestionStatus::Failed(reason.clone()),
            None => IngestionStatus::Completed,
        };
        let status = if polls_remaining > 0 {
            IngestionStatus::InProgress
        } else {
            outcome.clone()
        };

        state.store_mut(index_id)?.documents.push(Document {
            id: blob_id.to_string(),
            polls_remaining,
            outcome,
        });

        Ok(DocumentRef {
            id: blob_id.to_string(),
            status,
        })
    }

    async fn document_status(
        &self,
        index_id: &str,
        document_id: &str,
    ) -> AppResult<IngestionStatus> {
        let mut state = self.authorized()?;
        let document = state
            .store_mut(index_id)?
            .documents
            .iter_mut()
            .find(|document| document.id == document_id)
            .ok_or_else(|| {
                AppError::api(
                    Some(404),
                    format!("No file {} in vector store {}", document_id, index_id),
                )
            })?;

        if document.polls_remaining > 0 {
            document.polls_remaining -= 1;
        }
        if document.polls_remaining > 0 {
            Ok(IngestionStatus::InProgress)
        } else {
            Ok(document.outcome.clone())
        }
    }
}

#[async_trait::async_trait]
impl AssistantService for InMemoryBackend {
    async fn create_assistant(
        &self,
        spec: &AssistantSpec,
        index_id: &str,
    ) -> AppResult<AssistantHandle> {
        let mut state = self.authorized()?;
        state.calls.push(format!("create_assistant:{}", index_id));
        let assistant_id = new_id("asst_");
        state.assistants.insert(
            assistant_id.clone(),
            Assistant {
                spec: spec.clone(),
                index_id: index_id.to_string(),
            },
        );
        Ok(AssistantHandle {
            assistant_id,
            index_id: index_id.to_string(),
        })
    }

    async fn bind_assistant(&self, assistant_id: &str, index_id: &str) -> AppResult<()> {
        let mut state = self.authorized()?;
        state.calls.push(format!("bind:{}:{}", assistant_id, index_id));
        if state.failures.bind_assistant {
            return Err(injected("bind_assistant"));
        }
        let assistant = state.assistants.get_mut(assistant_id).ok_or_else(|| {
            AppError::api(Some(404), format!("No assistant found with id '{}'", assistant_id))
        })?;
        assistant.index_id = index_id.to_string();
        Ok(())
    }

    async fn start_run(&self, assistant_id: &str, question: &str) -> AppResult<RunRef> {
        let mut state = self.authorized()?;
        state.calls.push(format!("start_run:{}", assistant_id));
        let assistant = state.assistants.get(assistant_id).ok_or_else(|| {
            AppError::api(Some(404), format!("No assistant found with id '{}'", assistant_id))
        })?;
        tracing::debug!(
            "Running '{}' ({}) against {}",
            assistant.spec.name,
            assistant.spec.model,
            assistant.index_id
        );
        let index_id = assistant.index_id.clone();

        let (outcome, answer) = if let Some(reason) = &state.failures.run {
            let failed = RunStatus::Failed {
                status: "failed".to_string(),
                reason: reason.clone(),
            };
            (failed, None)
        } else {
            match state.grounded_answer(&index_id, question) {
                Ok(answer) => (RunStatus::Completed, Some(answer)),
                Err(_) => {
                    let failed = RunStatus::Failed {
                        status: "failed".to_string(),
                        reason: format!("Vector store {} not found", index_id),
                    };
                    (failed, None)
                }
            }
        };

        let thread_id = new_id("thread_");
        let run_id = new_id("run_");
        let polls_remaining = state.run_polls;
        state.runs.insert(
            run_id.clone(),
            Run {
                thread_id: thread_id.clone(),
                polls_remaining,
                outcome,
                answer,
            },
        );

        Ok(RunRef { thread_id, run_id })
    }

    async fn run_status(&self, run: &RunRef) -> AppResult<RunStatus> {
        let mut state = self.authorized()?;
        let stall = state.failures.stall_runs;
        let record = state.runs.get_mut(&run.run_id).ok_or_else(|| {
            AppError::api(Some(404), format!("No run found with id '{}'", run.run_id))
        })?;

        if stall {
            return Ok(RunStatus::Pending("in_progress".to_string()));
        }
        if record.polls_remaining > 0 {
            record.polls_remaining -= 1;
        }
        if record.polls_remaining > 0 {
            return Ok(RunStatus::Pending("in_progress".to_string()));
        }

        let outcome = record.outcome.clone();
        let thread_id = record.thread_id.clone();
        if let Some(answer) = record.answer.take() {
            state.answers.insert(thread_id, answer);
        }
        Ok(outcome)
    }

    async fn latest_answer(&self, thread_id: &str) -> AppResult<Option<String>> {
        let state = self.authorized()?;
        Ok(state.answers.get(thread_id).cloned())
    }
}
