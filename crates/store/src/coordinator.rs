//! The index-overwrite protocol.
//!
//! Replacing an index's contents is done by tearing the index down and
//! building a fresh one under the same name:
//!
//! 1. resolve the target's display name
//! 2. enumerate its documents
//! 3. detach each document, then delete its blob
//! 4. delete the empty index
//! 5. create a new index with the captured name
//! 6. upload the batch as one document and wait for ingestion
//! 7. rebind the session's assistant handle to the new index
//!
//! Between steps 4 and 5 the named index does not exist at all. A failure
//! there is reported as `IndexCreationFailed` and never retried. Cleanup
//! failures in step 3 and rebind failures in step 7 are warnings.

use crate::catalog;
use crate::ingest::{upload_file_name, ContentBatch};
use crate::poll::{poll_until, PollPolicy, PollStep};
use crate::progress::{OverwritePhase, ProgressReporter};
use crate::session::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use vsctl_api::{AssistantService, IndexService, IngestionStatus};
use vsctl_core::{AppError, AppResult};

/// Non-fatal problem encountered during an overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverwriteWarning {
    /// A document could not be detached, or its blob could not be deleted
    OrphanedDocument {
        file_id: String,
        stage: String,
        reason: String,
    },

    /// The cached assistant could not be pointed at the new index
    HandleRebind {
        assistant_id: String,
        reason: String,
    },
}

impl fmt::Display for OverwriteWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedDocument {
                file_id,
                stage,
                reason,
            } => write!(f, "orphaned document {} ({} failed: {})", file_id, stage, reason),
            Self::HandleRebind {
                assistant_id,
                reason,
            } => write!(f, "assistant {} was not rebound: {}", assistant_id, reason),
        }
    }
}

/// Outcome of a completed overwrite.
#[derive(Debug, Clone, Serialize)]
pub struct OverwriteReport {
    pub new_index_id: String,
    pub previous_index_id: String,
    pub name: Option<String>,
    pub documents_removed: usize,
    pub uploaded_document: Option<String>,
    pub rows: usize,
    pub warnings: Vec<OverwriteWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of an upload into an existing index.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub index_id: String,
    pub name: Option<String>,
    pub uploaded_document: Option<String>,
    pub rows: usize,
}

/// Runs the overwrite protocol against one backend.
pub struct IndexOverwriteCoordinator<'a> {
    indexes: &'a dyn IndexService,
    assistants: &'a dyn AssistantService,
    poll: PollPolicy,
    progress: ProgressReporter,
}

impl<'a> IndexOverwriteCoordinator<'a> {
    pub fn new(indexes: &'a dyn IndexService, assistants: &'a dyn AssistantService) -> Self {
        Self {
            indexes,
            assistants,
            poll: PollPolicy::default(),
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the contents of `target_index_id` with `batch`.
    ///
    /// The session's assistant handle follows the new index, and so does
    /// its selection when it named the target or was empty. The previous
    /// index id is dead afterwards.
    pub async fn overwrite(
        &self,
        session: &mut SessionState,
        target_index_id: &str,
        batch: &ContentBatch,
    ) -> AppResult<OverwriteReport> {
        let started_at = Utc::now();
        let mut warnings = Vec::new();

        // 1. resolve
        let target = catalog::resolve_id(self.indexes, target_index_id).await?;
        let name = target.name.clone();
        self.progress.step(
            OverwritePhase::Resolve,
            format!("Overwriting '{}' ({})", target.display_name(), target.id),
        );

        // 2. enumerate
        let documents = catalog::documents(self.indexes, &target.id).await?;
        let total = documents.len() as u64;
        self.progress.step(
            OverwritePhase::Enumerate,
            format!("{} documents to remove", total),
        );

        // 3. detach, then delete blob
        let mut documents_removed = 0;
        for (i, document) in documents.iter().enumerate() {
            let current = i as u64 + 1;
            if let Err(e) = self.indexes.detach_document(&target.id, &document.id).await {
                let warning = OverwriteWarning::OrphanedDocument {
                    file_id: document.id.clone(),
                    stage: "detach".to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!("{}", warning);
                self.progress
                    .counted(OverwritePhase::Cleanup, current, total, warning.to_string());
                warnings.push(warning);
                continue;
            }
            documents_removed += 1;

            match self.indexes.delete_blob(&document.id).await {
                Ok(()) => self.progress.counted(
                    OverwritePhase::Cleanup,
                    current,
                    total,
                    format!("Removed {}", document.id),
                ),
                Err(e) => {
                    let warning = OverwriteWarning::OrphanedDocument {
                        file_id: document.id.clone(),
                        stage: "delete-blob".to_string(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", warning);
                    self.progress
                        .counted(OverwritePhase::Cleanup, current, total, warning.to_string());
                    warnings.push(warning);
                }
            }
        }

        // 4. delete the index
        self.indexes
            .delete_index(&target.id)
            .await
            .map_err(|e| AppError::IndexDeletionFailed {
                index_id: target.id.clone(),
                reason: e.to_string(),
            })?;
        self.progress
            .step(OverwritePhase::DeleteIndex, format!("Deleted {}", target.id));

        // 5. recreate under the same name
        let created = match self.indexes.create_index(name.as_deref()).await {
            Ok(created) => created,
            Err(e) => {
                session.deselect(&target.id);
                tracing::error!(
                    "Index '{}' was deleted and could not be recreated: {}",
                    target.display_name(),
                    e
                );
                return Err(AppError::IndexCreationFailed {
                    name: target.display_name().to_string(),
                    previous_index_id: target.id.clone(),
                    reason: e.to_string(),
                });
            }
        };
        self.progress.step(
            OverwritePhase::CreateIndex,
            format!("Created {} as '{}'", created.id, created.display_name()),
        );

        // 6. upload and ingest
        let file_name = upload_file_name(name.as_deref(), &target.id);
        let uploaded = self.ingest(&created.id, &file_name, batch).await;

        // 7. rebind, also when ingestion failed so a retried upload needs no rebind
        session.follow_replacement(&target.id, &created.id);
        if let Some(warning) = self.rebind(session, &target.id, &created.id).await {
            warnings.push(warning);
        }
        let uploaded_document = uploaded?;

        Ok(OverwriteReport {
            new_index_id: created.id,
            previous_index_id: target.id,
            name,
            documents_removed,
            uploaded_document,
            rows: batch.len(),
            warnings,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Upload `batch` into an existing index without touching its documents.
    pub async fn upload(&self, index_id: &str, batch: &ContentBatch) -> AppResult<UploadReport> {
        let index = catalog::resolve_id(self.indexes, index_id).await?;
        let file_name = upload_file_name(index.name.as_deref(), &index.id);
        let uploaded_document = self.ingest(&index.id, &file_name, batch).await?;

        Ok(UploadReport {
            index_id: index.id,
            name: index.name,
            uploaded_document,
            rows: batch.len(),
        })
    }

    /// Upload the batch as one document and wait for ingestion.
    ///
    /// Returns the document id, or `None` for an empty batch.
    async fn ingest(
        &self,
        index_id: &str,
        file_name: &str,
        batch: &ContentBatch,
    ) -> AppResult<Option<String>> {
        let failed = |reason: String| AppError::IngestionFailed {
            index_id: index_id.to_string(),
            reason,
        };

        if batch.is_empty() {
            self.progress
                .step(OverwritePhase::Upload, "No rows to upload; index left empty");
            return Ok(None);
        }

        let payload = batch.to_json_lines()?.into_bytes();
        let blob_id = self
            .indexes
            .upload_blob(file_name, payload)
            .await
            .map_err(|e| failed(e.to_string()))?;
        self.progress.step(
            OverwritePhase::Upload,
            format!("Uploaded {} rows as {} ({})", batch.len(), file_name, blob_id),
        );

        let document = match self.indexes.attach_document(index_id, &blob_id).await {
            Ok(document) => document,
            Err(e) => {
                if let Err(cleanup) = self.indexes.delete_blob(&blob_id).await {
                    tracing::warn!("Unattached blob {} was not deleted: {}", blob_id, cleanup);
                }
                return Err(failed(e.to_string()));
            }
        };

        let status = if document.status.is_terminal() {
            Ok(document.status.clone())
        } else {
            self.wait_for_ingestion(index_id, &document.id).await
        };

        let reason = match status {
            Ok(IngestionStatus::Completed) => {
                self.progress
                    .step(OverwritePhase::Ingest, format!("Ingested {}", document.id));
                return Ok(Some(document.id));
            }
            Ok(IngestionStatus::Failed(reason)) => reason,
            Ok(IngestionStatus::Cancelled) => "ingestion was cancelled".to_string(),
            Ok(IngestionStatus::InProgress) => "ingestion still in progress".to_string(),
            Err(e) => e.to_string(),
        };

        // leave the index empty rather than holding a half-ingested document
        self.discard(index_id, &document.id).await;
        Err(failed(reason))
    }

    /// Poll a document until its ingestion stops. A timeout is an error.
    async fn wait_for_ingestion(
        &self,
        index_id: &str,
        document_id: &str,
    ) -> AppResult<IngestionStatus> {
        let mut polls = 0u64;
        let label = format!("ingestion of {}", document_id);
        let outcome = poll_until(self.poll, &label, || {
            polls += 1;
            self.progress.step(
                OverwritePhase::Ingest,
                format!("Waiting for {} (check {})", document_id, polls),
            );
            let check = self.indexes.document_status(index_id, document_id);
            async move {
                let status = check.await?;
                Ok::<_, AppError>(if status.is_terminal() {
                    PollStep::Ready(status)
                } else {
                    PollStep::Pending
                })
            }
        })
        .await?;

        outcome.ok_or_else(|| {
            AppError::Other(format!(
                "ingestion did not finish within {:?}",
                self.poll.timeout
            ))
        })
    }

    /// Best-effort removal of a document that failed to ingest.
    async fn discard(&self, index_id: &str, document_id: &str) {
        if let Err(e) = self.indexes.detach_document(index_id, document_id).await {
            tracing::warn!("Failed document {} left attached: {}", document_id, e);
            return;
        }
        if let Err(e) = self.indexes.delete_blob(document_id).await {
            tracing::warn!("Blob of failed document {} not deleted: {}", document_id, e);
        }
    }

    /// Point the cached handle at the new index if it searched the old one.
    async fn rebind(
        &self,
        session: &mut SessionState,
        old_index_id: &str,
        new_index_id: &str,
    ) -> Option<OverwriteWarning> {
        if !session.is_bound_to(old_index_id) {
            return None;
        }
        let assistant_id = session.assistant()?.assistant_id.clone();

        match self
            .assistants
            .bind_assistant(&assistant_id, new_index_id)
            .await
        {
            Ok(()) => {
                session.rebind(new_index_id);
                self.progress.step(
                    OverwritePhase::Rebind,
                    format!("Assistant {} now searches {}", assistant_id, new_index_id),
                );
                None
            }
            Err(e) => {
                let warning = OverwriteWarning::HandleRebind {
                    assistant_id,
                    reason: e.to_string(),
                };
                tracing::warn!("{}", warning);
                self.progress
                    .step(OverwritePhase::Rebind, warning.to_string());
                Some(warning)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_messages() {
        let orphan = OverwriteWarning::OrphanedDocument {
            file_id: "file-1".to_string(),
            stage: "delete-blob".to_string(),
            reason: "500".to_string(),
        };
        assert_eq!(
            orphan.to_string(),
            "orphaned document file-1 (delete-blob failed: 500)"
        );

        let rebind = OverwriteWarning::HandleRebind {
            assistant_id: "asst_1".to_string(),
            reason: "404".to_string(),
        };
        assert!(rebind.to_string().contains("asst_1"));
    }

    #[test]
    fn test_warning_serialization() {
        let warning = OverwriteWarning::HandleRebind {
            assistant_id: "asst_1".to_string(),
            reason: "gone".to_string(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "handle_rebind");
        assert_eq!(json["assistant_id"], "asst_1");
    }
}
