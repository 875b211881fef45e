//! The analysis pipeline and its task state machine.
//!
//! ```text
//! submit ──▶ pending ──execute──▶ processing ──┬──▶ completed (report)
//!                                              └──▶ failed (reason)
//! ```
//!
//! [`Analyzer::submit`] validates the submission, stores the document,
//! persists a `pending` task and hands its id to a [`Scheduler`].
//! [`Analyzer::execute`] is called once per task by a worker; every error
//! after the `processing` transition is converted into a `failed` task.
//!
//! # Redelivery
//!
//! Executing a task that is not `pending` never touches the record:
//!
//! | Current status | Result |
//! |----------------|--------|
//! | `processing` | [`AnalysisError::InvalidState`], logged as a warning |
//! | `completed` / `failed` | `Ok(status)`, logged no-op |
//!
//! Tasks interrupted mid-flight (process crash) are failed with reason
//! `interrupted` by [`Analyzer::recover`] on the next start.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use cv_analyzer_core::models::{AnalysisTask, TaskOutcome, TaskReport, TaskStatus};
use cv_analyzer_core::prompt::{check_report, render_prompt, SYSTEM_INSTRUCTION};
use cv_analyzer_core::store::TaskStore;

use crate::config::Config;
use crate::db;
use crate::error::AnalysisError;
use crate::extract::ContentExtractor;
use crate::inference::{ChatMessage, InferenceClient, InferenceError, OllamaClient};
use crate::retrieval::{self, RetrievalSettings};
use crate::sqlite_store::SqliteTaskStore;
use crate::storage::{DocumentStorage, LocalStorage};
use crate::submission::Submission;

/// Failure reason recorded by the recovery sweep.
pub const INTERRUPTED_REASON: &str = "interrupted";

/// Hands task ids to whatever executes them.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule(&self, task_id: &str) -> anyhow::Result<()>;
}

/// Pipeline settings taken from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub strict_extraction: bool,
    pub max_upload_bytes: usize,
    pub retrieval: Option<RetrievalSettings>,
}

impl AnalysisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            strict_extraction: config.extraction.strict,
            max_upload_bytes: config.server.max_upload_bytes,
            retrieval: RetrievalSettings::from_config(config),
        }
    }
}

/// Outcome of [`Analyzer::recover`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub rescheduled: usize,
    pub interrupted: usize,
}

pub struct Analyzer {
    store: Arc<dyn TaskStore>,
    storage: Arc<dyn DocumentStorage>,
    extractor: ContentExtractor,
    inference: Arc<dyn InferenceClient>,
    scheduler: Arc<dyn Scheduler>,
    settings: AnalysisSettings,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn TaskStore>,
        storage: Arc<dyn DocumentStorage>,
        inference: Arc<dyn InferenceClient>,
        scheduler: Arc<dyn Scheduler>,
        settings: AnalysisSettings,
    ) -> Self {
        let extractor = ContentExtractor::new(storage.clone(), settings.strict_extraction);
        Self {
            store,
            storage,
            extractor,
            inference,
            scheduler,
            settings,
        }
    }

    /// Wire an analyzer from configuration: SQLite task store, local
    /// document storage and the Ollama client.
    pub async fn from_config(
        config: &Config,
        scheduler: Arc<dyn Scheduler>,
    ) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let store = Arc::new(SqliteTaskStore::new(pool));
        let storage = Arc::new(LocalStorage::new(config.storage.root.clone()));
        let inference = Arc::new(OllamaClient::new(config.inference.clone())?);
        Ok(Self::new(
            store,
            storage,
            inference,
            scheduler,
            AnalysisSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Validate, store and enqueue a submission. Returns the `pending` task.
    pub async fn submit(&self, submission: Submission) -> Result<AnalysisTask, AnalysisError> {
        let validated = submission.validate(self.settings.max_upload_bytes)?;

        let document_ref = format!(
            "cvs/{}.{}",
            uuid::Uuid::new_v4(),
            validated.kind.extension()
        );
        self.storage.put(&document_ref, &validated.bytes).await?;

        let task = AnalysisTask::new(document_ref, validated.subject, validated.job);
        self.store.insert(&task).await?;
        info!(task = %task.id, document = %task.document_ref, "analysis submitted");

        if let Err(e) = self.scheduler.schedule(&task.id).await {
            error!(task = %task.id, error = %e, "failed to schedule analysis; it stays pending until the next recovery sweep");
        }

        Ok(task)
    }

    /// Run one task to a terminal state. Returns the status reached.
    pub async fn execute(&self, task_id: &str) -> Result<TaskStatus, AnalysisError> {
        let task = self
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| AnalysisError::NotFound(task_id.to_string()))?;

        if task.status != TaskStatus::Pending {
            return self.refuse_redelivery(task_id, task.status);
        }

        if !self
            .store
            .transition(task_id, TaskStatus::Pending, TaskStatus::Processing, None)
            .await?
        {
            // Another worker won the compare-and-set.
            let current = self
                .store
                .get(task_id)
                .await?
                .map(|t| t.status)
                .unwrap_or(TaskStatus::Processing);
            return self.refuse_redelivery(task_id, current);
        }
        info!(task = %task_id, "analysis processing");

        let outcome = match self.run(&task).await {
            Ok(report) => TaskOutcome::Completed { report },
            Err(e) => {
                error!(task = %task_id, error = %e, "analysis failed");
                TaskOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        let target = outcome.status();

        let written = match self
            .store
            .transition(task_id, TaskStatus::Processing, target, Some(&outcome))
            .await
        {
            Ok(written) => written,
            Err(e) => {
                error!(task = %task_id, status = %target, error = %e, "could not record analysis result");
                // One attempt to leave the task terminal instead of processing.
                let reason = format!("could not record result: {}", e);
                if let Err(fallback) = self.fail_stalled(task_id, &reason).await {
                    error!(task = %task_id, error = %fallback, "task left processing until the next recovery sweep");
                }
                return Err(e.into());
            }
        };

        if written {
            info!(task = %task_id, status = %target, "analysis finished");
            Ok(target)
        } else {
            let current = self.status(task_id).await?.status;
            warn!(task = %task_id, status = %current, "task changed while processing; result discarded");
            Ok(current)
        }
    }

    fn refuse_redelivery(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<TaskStatus, AnalysisError> {
        if status.is_terminal() {
            info!(task = %task_id, status = %status, "task already finished; nothing to do");
            return Ok(status);
        }
        warn!(task = %task_id, status = %status, "refusing to execute task that is not pending");
        Err(AnalysisError::InvalidState {
            id: task_id.to_string(),
            status,
        })
    }

    async fn run(&self, task: &AnalysisTask) -> Result<String, AnalysisError> {
        let mut text = self.extractor.extract(&task.document_ref).await?;

        if let Some(settings) = &self.settings.retrieval {
            text = retrieval::select_passages(
                self.inference.as_ref(),
                &text,
                &task.job.retrieval_query(),
                settings,
            )
            .await?;
        }

        let prompt = render_prompt(&task.subject, &task.job, &text);
        let messages = [
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(prompt),
        ];
        let report = self.inference.chat(&messages).await?;
        if report.trim().is_empty() {
            return Err(InferenceError::EmptyResponse.into());
        }

        let issues = check_report(&report, &task.subject, &task.job);
        if !issues.is_empty() {
            warn!(task = %task.id, ?issues, "report does not follow the requested format");
        }

        Ok(report)
    }

    /// `{status, report}` for a task.
    pub async fn status(&self, task_id: &str) -> Result<TaskReport, AnalysisError> {
        self.store
            .get(task_id)
            .await?
            .map(|t| t.report_view())
            .ok_or_else(|| AnalysisError::NotFound(task_id.to_string()))
    }

    /// Full task record, including the failure reason.
    pub async fn task(&self, task_id: &str) -> Result<AnalysisTask, AnalysisError> {
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| AnalysisError::NotFound(task_id.to_string()))
    }

    /// Ids of tasks waiting to run, oldest first.
    pub async fn pending(&self) -> Result<Vec<String>, AnalysisError> {
        Ok(self.store.list_by_status(TaskStatus::Pending).await?)
    }

    /// Mark a `processing` task failed. Returns `false` if it was not
    /// processing.
    pub async fn fail_stalled(&self, task_id: &str, reason: &str) -> Result<bool, AnalysisError> {
        let outcome = TaskOutcome::Failed {
            reason: reason.to_string(),
        };
        let changed = self
            .store
            .transition(
                task_id,
                TaskStatus::Processing,
                TaskStatus::Failed,
                Some(&outcome),
            )
            .await?;
        if changed {
            error!(task = %task_id, reason = %reason, "analysis failed");
        }
        Ok(changed)
    }

    /// Startup sweep: fail interrupted tasks and reschedule pending ones.
    pub async fn recover(&self) -> Result<RecoverySummary, AnalysisError> {
        let mut summary = RecoverySummary::default();

        for id in self.store.list_by_status(TaskStatus::Processing).await? {
            if self.fail_stalled(&id, INTERRUPTED_REASON).await? {
                summary.interrupted += 1;
            }
        }

        for id in self.pending().await? {
            match self.scheduler.schedule(&id).await {
                Ok(()) => summary.rescheduled += 1,
                Err(e) => warn!(task = %id, error = %e, "failed to reschedule pending task"),
            }
        }

        if summary != RecoverySummary::default() {
            info!(
                rescheduled = summary.rescheduled,
                interrupted = summary.interrupted,
                "recovery sweep complete"
            );
        }
        Ok(summary)
    }
}
