//! Error type for the analysis pipeline.

use thiserror::Error;

use cv_analyzer_core::models::TaskStatus;
use cv_analyzer_core::scoring::ScoreError;

use crate::extract::ExtractError;
use crate::inference::InferenceError;
use crate::storage::StorageError;
use crate::submission::ValidationErrors;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("analysis not found: {0}")]
    NotFound(String),

    #[error("analysis {id} is {status} and cannot be executed")]
    InvalidState { id: String, status: TaskStatus },

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] ScoreError),

    #[error("persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}
