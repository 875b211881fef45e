//! Core data models for CV Analyzer.
//!
//! These types describe an analysis task as it moves through the pipeline:
//! the structured context supplied at submission, the task record and its
//! status lifecycle, and the passages used during retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Organization used in the report header when none was supplied.
pub const DEFAULT_TARGET_COMPANY: &str = "the Employer";

/// Preparer used in the report header when the candidate gave no name.
pub const DEFAULT_PREPARER: &str = "Professional Career Analyst";

/// Lifecycle state of an analysis task.
///
/// ```text
/// pending ──▶ processing ──┬──▶ completed
///                          └──▶ failed
/// ```
///
/// Transitions only move forward and never skip `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown task status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Who the analysis is prepared for and how they want it framed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectContext {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub target_country: String,
    pub current_career_level: String,
    #[serde(default)]
    pub analysis_preferences: Vec<String>,
}

impl SubjectContext {
    /// Name printed as the report's preparer.
    pub fn preparer(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_PREPARER)
    }
}

/// The position the document is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_title: String,
    pub job_description: String,
    pub target_company: String,
    pub industry: String,
    pub experience_level: String,
}

impl JobContext {
    /// Text used as the retrieval query: title followed by description.
    pub fn retrieval_query(&self) -> String {
        format!("{} {}", self.job_title, self.job_description)
    }
}

/// A submitted analysis and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisTask {
    /// External identity token (UUID v4), distinct from the storage row id.
    pub id: String,
    pub status: TaskStatus,
    /// Opaque blob storage reference, e.g. `cvs/<uuid>.pdf`.
    pub document_ref: String,
    pub subject: SubjectContext,
    pub job: JobContext,
    /// Present iff `status` is `completed`.
    pub report: Option<String>,
    /// Operator-facing reason recorded on the `failed` transition.
    #[serde(skip_serializing)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisTask {
    /// Builds a fresh `pending` task with a random identity token.
    pub fn new(document_ref: String, subject: SubjectContext, job: JobContext) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            document_ref,
            subject,
            job,
            report: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The view exposed on the status boundary.
    pub fn report_view(&self) -> TaskReport {
        TaskReport {
            status: self.status,
            report: if self.status == TaskStatus::Completed {
                self.report.clone()
            } else {
                None
            },
        }
    }
}

/// `{status, report}` as returned by a status lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub status: TaskStatus,
    pub report: Option<String>,
}

/// The outcome written by a task's second (terminal) transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { report: String },
    Failed { reason: String },
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed { .. } => TaskStatus::Completed,
            TaskOutcome::Failed { .. } => TaskStatus::Failed,
        }
    }
}

/// A contiguous chunk of extracted document text with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPassage {
    /// Ordinal of the chunk within its extraction pass.
    pub position: usize,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A passage paired with its hybrid relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage<'a> {
    pub passage: &'a TextPassage,
    /// `semantic_weight × semantic + (1 − semantic_weight) × lexical`.
    pub score: f64,
    pub semantic: f64,
    pub lexical: f64,
}
