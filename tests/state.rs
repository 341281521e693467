use std::sync::Arc;

use tempfile::tempdir;
use url::Url;
use uuid::Uuid;

use page_transform::contract::TransformationStateManager;
use page_transform::error::TransformationError;
use page_transform::state::{FileTransformationStateManager, InMemoryTransformationStateManager};
use page_transform::status::{
    ProcessState, TaskState, TasksStatusQuery, TransformationProcessStatus,
    TransformationProcessTaskStatus,
};

/// Runs the shared contract checks against one state manager.
async fn exercise(state: Arc<dyn TransformationStateManager>) {
    let process_id = Uuid::new_v4();
    let other_process = Uuid::new_v4();
    assert!(state.read_process_status(process_id).await.unwrap().is_none());

    let running = TransformationProcessStatus::new(process_id, 1, 0, Some(4), ProcessState::Running);
    state.write_process_status(&running).await.unwrap();
    assert_eq!(
        state.read_process_status(process_id).await.unwrap(),
        Some(running.clone())
    );

    // Last writer wins.
    let completed =
        TransformationProcessStatus::new(process_id, 4, 0, Some(4), ProcessState::Completed);
    state.write_process_status(&completed).await.unwrap();
    assert_eq!(
        state.read_process_status(process_id).await.unwrap(),
        Some(completed)
    );

    let url = Url::parse("https://contoso.example/SitePages/a.aspx").unwrap();
    let first = TransformationProcessTaskStatus::pending(process_id, Uuid::new_v4(), "a".into())
        .running()
        .completed(&url);
    let second = TransformationProcessTaskStatus::pending(process_id, Uuid::new_v4(), "b".into())
        .running()
        .faulted(&TransformationError::MissingArgument("title"));
    let foreign =
        TransformationProcessTaskStatus::pending(other_process, Uuid::new_v4(), "c".into());
    for status in [&first, &second, &foreign] {
        state.write_task_status(status).await.unwrap();
    }

    assert_eq!(
        state
            .read_task_status(process_id, first.task_id)
            .await
            .unwrap(),
        Some(first.clone())
    );
    let all = state
        .query_task_statuses(process_id, &TasksStatusQuery::all())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    let faulted = state
        .query_task_statuses(process_id, &TasksStatusQuery::with_state(TaskState::Faulted))
        .await
        .unwrap();
    assert_eq!(faulted, vec![second.clone()]);

    assert!(state.remove_task_status(process_id, second.task_id).await.unwrap());
    assert!(!state.remove_task_status(process_id, second.task_id).await.unwrap());

    assert!(state.remove_process_status(process_id).await.unwrap());
    assert!(state.read_process_status(process_id).await.unwrap().is_none());
    assert!(state
        .read_task_status(process_id, first.task_id)
        .await
        .unwrap()
        .is_none());
    assert!(!state.remove_process_status(process_id).await.unwrap());

    // Removing one process leaves the others alone.
    assert_eq!(
        state
            .read_task_status(other_process, foreign.task_id)
            .await
            .unwrap(),
        Some(foreign)
    );
}

#[tokio::test]
async fn test_in_memory_state_manager() {
    exercise(Arc::new(InMemoryTransformationStateManager::new())).await;
}

#[tokio::test]
async fn test_file_state_manager() {
    let dir = tempdir().unwrap();
    exercise(Arc::new(FileTransformationStateManager::new(dir.path()))).await;
}

#[tokio::test]
async fn test_file_state_survives_a_new_manager() {
    let dir = tempdir().unwrap();
    let process_id = Uuid::new_v4();
    let status = TransformationProcessStatus::new(process_id, 0, 0, None, ProcessState::Pending);
    FileTransformationStateManager::new(dir.path())
        .write_process_status(&status)
        .await
        .unwrap();

    let reopened = FileTransformationStateManager::new(dir.path());
    assert_eq!(
        reopened.read_process_status(process_id).await.unwrap(),
        Some(status)
    );
    assert!(dir
        .path()
        .join(process_id.to_string())
        .join("process.json")
        .exists());
}

#[tokio::test]
async fn test_corrupt_status_file_is_reported() {
    let dir = tempdir().unwrap();
    let process_id = Uuid::new_v4();
    let process_dir = dir.path().join(process_id.to_string());
    std::fs::create_dir_all(&process_dir).unwrap();
    std::fs::write(process_dir.join("process.json"), b"{ not json").unwrap();

    let err = FileTransformationStateManager::new(dir.path())
        .read_process_status(process_id)
        .await
        .unwrap_err();
    assert!(matches!(err, TransformationError::StateManager(_)));
}

#[tokio::test]
async fn test_concurrent_writes_to_one_key_all_succeed() {
    let dir = tempdir().unwrap();
    let state = Arc::new(FileTransformationStateManager::new(dir.path()));
    let process_id = Uuid::new_v4();

    let writes = (0..16).map(|done| {
        let state = state.clone();
        tokio::spawn(async move {
            let status =
                TransformationProcessStatus::new(process_id, done, 0, Some(16), ProcessState::Running);
            state.write_process_status(&status).await
        })
    });
    for result in futures::future::join_all(writes).await {
        result.unwrap().unwrap();
    }

    let last = state.read_process_status(process_id).await.unwrap().unwrap();
    assert!(last.done < 16);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join(process_id.to_string()))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|e| e == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
