//! One question through the managed conversational flow.

use crate::poll::{poll_until, PollPolicy, PollStep};
use crate::session::SessionState;
use vsctl_api::{AssistantHandle, AssistantService, AssistantSpec, RunStatus};
use vsctl_core::{AppError, AppResult};

/// Asks questions through a session's cached assistant.
pub struct QueryRunner<'a> {
    assistants: &'a dyn AssistantService,
    spec: AssistantSpec,
    poll: PollPolicy,
}

impl<'a> QueryRunner<'a> {
    pub fn new(assistants: &'a dyn AssistantService, spec: AssistantSpec) -> Self {
        Self {
            assistants,
            spec,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Answer `question` from the documents in `index_id`.
    ///
    /// The first query of a session creates the assistant; later queries
    /// reuse it, rebinding first when it searches a different index. A
    /// cached assistant the vendor no longer knows is replaced once. Every
    /// failure surfaces as `QueryFailed`.
    pub async fn query(
        &self,
        session: &mut SessionState,
        index_id: &str,
        question: &str,
    ) -> AppResult<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::QueryFailed("question is empty".to_string()));
        }

        self.ask(session, index_id, question)
            .await
            .map_err(|e| match e {
                AppError::QueryFailed(_) => e,
                other => AppError::QueryFailed(other.to_string()),
            })
    }

    async fn ask(
        &self,
        session: &mut SessionState,
        index_id: &str,
        question: &str,
    ) -> AppResult<String> {
        let handle = self.handle_for(session, index_id).await?;
        tracing::debug!(
            "Asking assistant {} about {}",
            handle.assistant_id,
            handle.index_id
        );

        let run = match self.assistants.start_run(&handle.assistant_id, question).await {
            Ok(run) => run,
            Err(e) if e.is_not_found() => {
                let handle = self.replace_handle(session, index_id, &e).await?;
                self.assistants
                    .start_run(&handle.assistant_id, question)
                    .await?
            }
            Err(e) => return Err(e),
        };

        let label = format!("run {}", run.run_id);
        let outcome = poll_until(self.poll, &label, || {
            let check = self.assistants.run_status(&run);
            async move {
                Ok::<_, AppError>(match check.await? {
                    RunStatus::Pending(_) => PollStep::Pending,
                    finished => PollStep::Ready(finished),
                })
            }
        })
        .await?;

        match outcome {
            None => Err(AppError::QueryFailed(format!(
                "run {} did not finish within {:?}",
                run.run_id, self.poll.timeout
            ))),
            Some(RunStatus::Failed { status, reason }) => Err(AppError::QueryFailed(format!(
                "run ended as {}: {}",
                status, reason
            ))),
            Some(_) => self
                .assistants
                .latest_answer(&run.thread_id)
                .await?
                .ok_or_else(|| {
                    AppError::QueryFailed("run completed without an answer".to_string())
                }),
        }
    }

    /// The session's handle, created or rebound so it searches `index_id`.
    async fn handle_for(
        &self,
        session: &mut SessionState,
        index_id: &str,
    ) -> AppResult<AssistantHandle> {
        match session.assistant().cloned() {
            None => self.create_handle(session, index_id).await,
            Some(mut handle) if handle.index_id != index_id => {
                match self
                    .assistants
                    .bind_assistant(&handle.assistant_id, index_id)
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        return self.replace_handle(session, index_id, &e).await;
                    }
                    Err(e) => return Err(e),
                }
                tracing::info!(
                    "Rebound assistant {} from {} to {}",
                    handle.assistant_id,
                    handle.index_id,
                    index_id
                );
                session.rebind(index_id);
                handle.index_id = index_id.to_string();
                Ok(handle)
            }
            Some(handle) => Ok(handle),
        }
    }

    async fn create_handle(
        &self,
        session: &mut SessionState,
        index_id: &str,
    ) -> AppResult<AssistantHandle> {
        let handle = self.assistants.create_assistant(&self.spec, index_id).await?;
        tracing::info!(
            "Created assistant {} for {}",
            handle.assistant_id,
            index_id
        );
        session.cache_assistant(handle.clone());
        Ok(handle)
    }

    /// Drop a cached handle the vendor rejected as unknown and create a new one.
    async fn replace_handle(
        &self,
        session: &mut SessionState,
        index_id: &str,
        cause: &AppError,
    ) -> AppResult<AssistantHandle> {
        if let Some(stale) = session.forget_assistant() {
            tracing::warn!(
                "Assistant {} is gone ({}); creating a new one",
                stale.assistant_id,
                cause
            );
        }
        self.create_handle(session, index_id).await
    }
}
