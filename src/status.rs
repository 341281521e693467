//! Immutable status snapshots of a transformation process and its tasks.
//!
//! A new value is built on every transition; nothing here is mutated in place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransformationError;
use crate::model::SourceItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    Pending,
    Running,
    Aborted,
    Completed,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Aborted | ProcessState::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Aborted,
    Completed,
    Faulted,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Aggregate state of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationProcessStatus {
    pub process_id: Uuid,
    pub done: usize,
    pub errors: usize,
    /// `None` while the source enumeration size is unknown.
    pub total: Option<usize>,
    /// `(done + errors) / total` in percent, `None` while `total` is unknown.
    pub percentage: Option<f64>,
    pub state: ProcessState,
}

impl TransformationProcessStatus {
    pub fn new(
        process_id: Uuid,
        done: usize,
        errors: usize,
        total: Option<usize>,
        state: ProcessState,
    ) -> Self {
        let percentage = total.map(|total| {
            if total == 0 {
                100.0
            } else {
                ((done + errors) as f64 * 100.0 / total as f64).min(100.0)
            }
        });
        Self {
            process_id,
            done,
            errors,
            total,
            percentage,
            state,
        }
    }

    pub fn pending(process_id: Uuid) -> Self {
        Self::new(process_id, 0, 0, None, ProcessState::Pending)
    }

    /// Number of tasks that ran to an outcome.
    pub fn processed(&self) -> usize {
        self.done + self.errors
    }
}

/// State of one task within a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationProcessTaskStatus {
    pub process_id: Uuid,
    pub task_id: Uuid,
    pub source_item_id: SourceItemId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub state: TaskState,
    #[serde(default)]
    pub target_page_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Formatted error source chain of a faulted task.
    #[serde(default)]
    pub error_trace: Option<String>,
}

impl TransformationProcessTaskStatus {
    pub fn pending(process_id: Uuid, task_id: Uuid, source_item_id: SourceItemId) -> Self {
        Self {
            process_id,
            task_id,
            source_item_id,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            state: TaskState::Pending,
            target_page_url: None,
            error_message: None,
            error_trace: None,
        }
    }

    pub fn running(&self) -> Self {
        Self {
            started_at: Some(Utc::now()),
            state: TaskState::Running,
            ..self.clone()
        }
    }

    pub fn completed(&self, target_page_url: &url::Url) -> Self {
        Self {
            ended_at: Some(Utc::now()),
            state: TaskState::Completed,
            target_page_url: Some(target_page_url.to_string()),
            ..self.clone()
        }
    }

    pub fn aborted(&self) -> Self {
        Self {
            ended_at: Some(Utc::now()),
            state: TaskState::Aborted,
            ..self.clone()
        }
    }

    pub fn faulted(&self, error: &TransformationError) -> Self {
        Self {
            ended_at: Some(Utc::now()),
            state: TaskState::Faulted,
            error_message: Some(error.to_string()),
            error_trace: Some(error.trace()),
            ..self.clone()
        }
    }
}

/// Filter for task status enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TasksStatusQuery {
    pub state: Option<TaskState>,
}

impl TasksStatusQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_state(state: TaskState) -> Self {
        Self { state: Some(state) }
    }

    pub fn matches(&self, status: &TransformationProcessTaskStatus) -> bool {
        self.state.map_or(true, |state| state == status.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_derived_from_total() {
        let id = Uuid::new_v4();
        assert_eq!(
            TransformationProcessStatus::new(id, 1, 1, Some(4), ProcessState::Running).percentage,
            Some(50.0)
        );
        assert_eq!(
            TransformationProcessStatus::new(id, 3, 0, None, ProcessState::Running).percentage,
            None
        );
        assert_eq!(
            TransformationProcessStatus::new(id, 0, 0, Some(0), ProcessState::Completed)
                .percentage,
            Some(100.0)
        );
    }

    #[test]
    fn faulted_snapshot_keeps_identity_and_records_error() {
        let pending =
            TransformationProcessTaskStatus::pending(Uuid::new_v4(), Uuid::new_v4(), "42".into());
        let faulted = pending
            .running()
            .faulted(&TransformationError::MissingArgument("source item"));
        assert_eq!(faulted.task_id, pending.task_id);
        assert_eq!(faulted.state, TaskState::Faulted);
        assert!(faulted.started_at.is_some());
        assert!(faulted
            .error_message
            .as_deref()
            .unwrap()
            .contains("source item"));
        assert_eq!(pending.state, TaskState::Pending);
    }
}
