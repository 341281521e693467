//! State managers: where process and task status snapshots live.
//!
//! - [`InMemoryTransformationStateManager`] keeps everything in concurrent maps
//!   for the lifetime of the process.
//! - [`FileTransformationStateManager`] writes one JSON document per status
//!   under a root folder, so a run can be inspected and resumed after a
//!   restart:
//!
//! ```text
//! <root>/<process_id>/process.json
//! <root>/<process_id>/tasks/<task_id>.json
//! ```
//!
//! Every write replaces the whole document (temporary file, then rename).
//! Concurrent writers to the same key: last writer wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::contract::TransformationStateManager;
use crate::error::{Result, TransformationError};
use crate::status::{TasksStatusQuery, TransformationProcessStatus, TransformationProcessTaskStatus};

#[derive(Debug, Default)]
pub struct InMemoryTransformationStateManager {
    processes: DashMap<Uuid, TransformationProcessStatus>,
    tasks: DashMap<(Uuid, Uuid), TransformationProcessTaskStatus>,
}

impl InMemoryTransformationStateManager {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_by_creation(mut statuses: Vec<TransformationProcessTaskStatus>) -> Vec<TransformationProcessTaskStatus> {
    statuses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.task_id.cmp(&b.task_id)));
    statuses
}

#[async_trait]
impl TransformationStateManager for InMemoryTransformationStateManager {
    async fn write_process_status(&self, status: &TransformationProcessStatus) -> Result<()> {
        self.processes.insert(status.process_id, status.clone());
        Ok(())
    }

    async fn read_process_status(
        &self,
        process_id: Uuid,
    ) -> Result<Option<TransformationProcessStatus>> {
        Ok(self.processes.get(&process_id).map(|s| s.value().clone()))
    }

    async fn remove_process_status(&self, process_id: Uuid) -> Result<bool> {
        let removed = self.processes.remove(&process_id).is_some();
        self.tasks.retain(|(pid, _), _| *pid != process_id);
        Ok(removed)
    }

    async fn write_task_status(&self, status: &TransformationProcessTaskStatus) -> Result<()> {
        self.tasks
            .insert((status.process_id, status.task_id), status.clone());
        Ok(())
    }

    async fn read_task_status(
        &self,
        process_id: Uuid,
        task_id: Uuid,
    ) -> Result<Option<TransformationProcessTaskStatus>> {
        Ok(self
            .tasks
            .get(&(process_id, task_id))
            .map(|s| s.value().clone()))
    }

    async fn query_task_statuses(
        &self,
        process_id: Uuid,
        query: &TasksStatusQuery,
    ) -> Result<Vec<TransformationProcessTaskStatus>> {
        let statuses = self
            .tasks
            .iter()
            .filter(|entry| entry.key().0 == process_id && query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(sort_by_creation(statuses))
    }

    async fn remove_task_status(&self, process_id: Uuid, task_id: Uuid) -> Result<bool> {
        Ok(self.tasks.remove(&(process_id, task_id)).is_some())
    }
}

#[derive(Debug, Clone)]
pub struct FileTransformationStateManager {
    root: PathBuf,
}

impl FileTransformationStateManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn process_dir(&self, process_id: Uuid) -> PathBuf {
        self.root.join(process_id.to_string())
    }

    fn process_file(&self, process_id: Uuid) -> PathBuf {
        self.process_dir(process_id).join("process.json")
    }

    fn tasks_dir(&self, process_id: Uuid) -> PathBuf {
        self.process_dir(process_id).join("tasks")
    }

    fn task_file(&self, process_id: Uuid, task_id: Uuid) -> PathBuf {
        self.tasks_dir(process_id).join(format!("{task_id}.json"))
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    // Unique per write; concurrent writers of one key each rename their own file.
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), "[STATE] Status written");
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        TransformationError::StateManager(format!("corrupt status file {}: {e}", path.display()))
    })
}

async fn remove_path(path: &Path, dir: bool) -> Result<bool> {
    let result = if dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl TransformationStateManager for FileTransformationStateManager {
    async fn write_process_status(&self, status: &TransformationProcessStatus) -> Result<()> {
        write_json(&self.process_file(status.process_id), status).await
    }

    async fn read_process_status(
        &self,
        process_id: Uuid,
    ) -> Result<Option<TransformationProcessStatus>> {
        read_json(&self.process_file(process_id)).await
    }

    async fn remove_process_status(&self, process_id: Uuid) -> Result<bool> {
        let existed = tokio::fs::try_exists(self.process_file(process_id)).await?;
        remove_path(&self.process_dir(process_id), true).await?;
        Ok(existed)
    }

    async fn write_task_status(&self, status: &TransformationProcessTaskStatus) -> Result<()> {
        write_json(&self.task_file(status.process_id, status.task_id), status).await
    }

    async fn read_task_status(
        &self,
        process_id: Uuid,
        task_id: Uuid,
    ) -> Result<Option<TransformationProcessTaskStatus>> {
        read_json(&self.task_file(process_id, task_id)).await
    }

    async fn query_task_statuses(
        &self,
        process_id: Uuid,
        query: &TasksStatusQuery,
    ) -> Result<Vec<TransformationProcessTaskStatus>> {
        let mut entries = match tokio::fs::read_dir(self.tasks_dir(process_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut statuses = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(status) = read_json::<TransformationProcessTaskStatus>(&path).await? {
                if query.matches(&status) {
                    statuses.push(status);
                }
            }
        }
        Ok(sort_by_creation(statuses))
    }

    async fn remove_task_status(&self, process_id: Uuid, task_id: Uuid) -> Result<bool> {
        remove_path(&self.task_file(process_id, task_id), false).await
    }
}
