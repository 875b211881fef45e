//! Storage abstraction for analysis tasks.
//!
//! The [`TaskStore`] trait defines every persistence operation the analysis
//! pipeline needs, enabling pluggable backends (SQLite in the application
//! crate, [`memory::InMemoryTaskStore`] for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{AnalysisTask, TaskOutcome, TaskStatus};

/// Abstract storage backend for analysis tasks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](TaskStore::insert) | Persist a freshly submitted task |
/// | [`get`](TaskStore::get) | Look a task up by identity token |
/// | [`transition`](TaskStore::transition) | Compare-and-set a status change |
/// | [`list_by_status`](TaskStore::list_by_status) | Ids in a given status, oldest first |
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Fails if the id already exists.
    async fn insert(&self, task: &AnalysisTask) -> Result<()>;

    /// Retrieve a task by its identity token.
    async fn get(&self, id: &str) -> Result<Option<AnalysisTask>>;

    /// Move task `id` from `from` to `to`, recording `outcome` when `to` is
    /// terminal.
    ///
    /// Returns `Ok(false)` without touching the record when the task is not
    /// currently in `from` (or does not exist). Returns an error for a
    /// transition the state machine forbids.
    async fn transition(
        &self,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
        outcome: Option<&TaskOutcome>,
    ) -> Result<bool>;

    /// Ids of all tasks in `status`, ordered by creation time.
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<String>>;
}

/// Shared legality check for [`TaskStore::transition`] implementations.
///
/// Terminal targets require a matching outcome; `processing` takes none.
pub fn check_transition(
    from: TaskStatus,
    to: TaskStatus,
    outcome: Option<&TaskOutcome>,
) -> Result<()> {
    if !from.can_transition_to(to) {
        bail!("illegal task transition {} -> {}", from, to);
    }
    match (to.is_terminal(), outcome) {
        (true, Some(o)) if o.status() == to => Ok(()),
        (true, Some(o)) => bail!("outcome {} does not match target {}", o.status(), to),
        (true, None) => bail!("transition to {} requires an outcome", to),
        (false, Some(_)) => bail!("transition to {} takes no outcome", to),
        (false, None) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_transition() {
        let done = TaskOutcome::Completed {
            report: "r".to_string(),
        };
        let failed = TaskOutcome::Failed {
            reason: "x".to_string(),
        };

        assert!(check_transition(TaskStatus::Pending, TaskStatus::Processing, None).is_ok());
        assert!(
            check_transition(TaskStatus::Processing, TaskStatus::Completed, Some(&done)).is_ok()
        );
        assert!(
            check_transition(TaskStatus::Processing, TaskStatus::Failed, Some(&failed)).is_ok()
        );

        assert!(check_transition(TaskStatus::Pending, TaskStatus::Completed, Some(&done)).is_err());
        assert!(
            check_transition(TaskStatus::Processing, TaskStatus::Completed, Some(&failed))
                .is_err()
        );
        assert!(check_transition(TaskStatus::Processing, TaskStatus::Failed, None).is_err());
        assert!(
            check_transition(TaskStatus::Pending, TaskStatus::Processing, Some(&done)).is_err()
        );
    }
}
