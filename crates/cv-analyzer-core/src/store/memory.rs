//! In-memory [`TaskStore`] implementation for testing and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. The compare-and-set in
//! [`transition`](TaskStore::transition) happens under the write lock, so
//! two concurrent writers can never both win.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{AnalysisTask, TaskOutcome, TaskStatus};

use super::{check_transition, TaskStore};

/// In-memory task store.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, AnalysisTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored tasks.
    pub fn len(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("task store lock poisoned")
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: &AnalysisTask) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        if tasks.contains_key(&task.id) {
            bail!("task {} already exists", task.id);
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<AnalysisTask>> {
        let tasks = self.tasks.read().map_err(poisoned)?;
        Ok(tasks.get(id).cloned())
    }

    async fn transition(
        &self,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
        outcome: Option<&TaskOutcome>,
    ) -> Result<bool> {
        check_transition(from, to, outcome)?;

        let mut tasks = self.tasks.write().map_err(poisoned)?;
        let task = match tasks.get_mut(id) {
            Some(t) if t.status == from => t,
            _ => return Ok(false),
        };

        task.status = to;
        task.updated_at = Utc::now();
        match outcome {
            Some(TaskOutcome::Completed { report }) => task.report = Some(report.clone()),
            Some(TaskOutcome::Failed { reason }) => {
                task.report = None;
                task.failure_reason = Some(reason.clone());
            }
            None => {}
        }
        Ok(true)
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<String>> {
        let tasks = self.tasks.read().map_err(poisoned)?;
        let mut matching: Vec<&AnalysisTask> =
            tasks.values().filter(|t| t.status == status).collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching.into_iter().map(|t| t.id.clone()).collect())
    }
}
