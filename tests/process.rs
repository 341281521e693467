use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tempfile::tempdir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use page_transform::contract::{
    MockPageTransformator, MockSourceProvider, MockTargetContext, PageTransformator,
    ProgressSink, TransformationExecutor, TransformationStateManager,
};
use page_transform::distiller::DefaultTransformationDistiller;
use page_transform::error::{BoxError, Result, TransformationError};
use page_transform::model::{PageTransformationTask, SourceItemId};
use page_transform::process::{
    InProcessTransformationExecutor, LongRunningTransformationExecutor,
};
use page_transform::state::FileTransformationStateManager;
use page_transform::status::{
    ProcessState, TaskState, TasksStatusQuery, TransformationProcessStatus,
    TransformationProcessTaskStatus,
};

fn page_url(id: &SourceItemId) -> Url {
    Url::parse(&format!("https://contoso.example/SitePages/{id}.aspx")).unwrap()
}

fn source(ids: Vec<&'static str>, total: Option<usize>) -> Arc<MockSourceProvider> {
    let mut source = MockSourceProvider::new();
    source.expect_get_items_ids().returning(move |_| {
        let ids: Vec<std::result::Result<SourceItemId, BoxError>> =
            ids.iter().map(|id| Ok(SourceItemId::new(*id))).collect();
        futures::stream::iter(ids).boxed()
    });
    source.expect_count_items().returning(move |_| Ok(total));
    Arc::new(source)
}

fn target() -> Arc<MockTargetContext> {
    Arc::new(MockTargetContext::new())
}

/// Transformator that fails the listed source items and completes the rest.
fn transformator(failing: &'static [&'static str]) -> MockPageTransformator {
    let mut transformator = MockPageTransformator::new();
    transformator.expect_transform().returning(move |task, _| {
        if failing.contains(&task.source_item_id().as_str()) {
            Err(TransformationError::MissingArgument("page title"))
        } else {
            Ok(page_url(task.source_item_id()))
        }
    });
    transformator
}

#[derive(Default)]
struct RecordingSink {
    snapshots: Mutex<Vec<TransformationProcessStatus>>,
}

impl RecordingSink {
    fn snapshots(&self) -> Vec<TransformationProcessStatus> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, status: &TransformationProcessStatus) {
        self.snapshots.lock().unwrap().push(status.clone());
    }
}

/// Waits for cancellation, signalling once the first task has started.
struct BlockingTransformator {
    started: Arc<Notify>,
}

#[async_trait]
impl PageTransformator for BlockingTransformator {
    async fn transform(&self, _task: &PageTransformationTask, token: &CancellationToken) -> Result<Url> {
        self.started.notify_one();
        token.cancelled().await;
        Err(TransformationError::Cancelled)
    }
}

fn executor(transformator: impl PageTransformator + 'static) -> InProcessTransformationExecutor {
    InProcessTransformationExecutor::new(
        Arc::new(DefaultTransformationDistiller::new()),
        Arc::new(transformator),
    )
}

#[tokio::test]
async fn test_empty_source_completes_immediately() {
    let mut transformator = MockPageTransformator::new();
    transformator.expect_transform().times(0);
    let executor = executor(transformator);

    let process = executor.create_transformation_process().await.unwrap();
    assert_eq!(process.get_status().await.unwrap().state, ProcessState::Pending);

    process.start_process(source(vec![], Some(0)), target()).await.unwrap();
    let status = process.wait_for_completion().await.unwrap();

    assert_eq!(status.state, ProcessState::Completed);
    assert_eq!((status.done, status.errors, status.total), (0, 0, Some(0)));
    assert_eq!(status.percentage, Some(100.0));
}

#[tokio::test]
async fn test_failed_task_is_counted_and_batch_continues() {
    let sink = Arc::new(RecordingSink::default());
    let executor = executor(transformator(&["2"])).with_progress_sink(sink.clone());

    let process = executor.create_transformation_process().await.unwrap();
    process
        .start_process(source(vec!["1", "2", "3"], Some(3)), target())
        .await
        .unwrap();
    let status = process.wait_for_completion().await.unwrap();

    assert_eq!(status.state, ProcessState::Completed);
    assert_eq!((status.done, status.errors, status.total), (2, 1, Some(3)));

    let faulted = process
        .get_task_statuses(&TasksStatusQuery::with_state(TaskState::Faulted))
        .await
        .unwrap();
    assert_eq!(faulted.len(), 1);
    assert_eq!(faulted[0].source_item_id.as_str(), "2");
    assert!(faulted[0].error_message.as_deref().unwrap().contains("page title"));

    let completed = process
        .get_task_statuses(&TasksStatusQuery::with_state(TaskState::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 2);
    assert!(completed.iter().all(|t| t.target_page_url.is_some()));

    let snapshots = sink.snapshots();
    assert!(snapshots.len() >= 4, "{snapshots:#?}");
    for snapshot in &snapshots {
        assert!(snapshot.processed() <= snapshot.total.unwrap());
    }
    assert_eq!(snapshots.last().unwrap(), &status);
}

#[tokio::test]
async fn test_unknown_total_is_fixed_on_completion() {
    let executor = executor(transformator(&[]));
    let process = executor.create_transformation_process().await.unwrap();
    process
        .start_process(source(vec!["a", "b"], None), target())
        .await
        .unwrap();
    let status = process.wait_for_completion().await.unwrap();
    assert_eq!(status.total, Some(2));
    assert_eq!(status.done, 2);
}

#[tokio::test]
async fn test_enumeration_error_counts_as_error() {
    let mut source = MockSourceProvider::new();
    source.expect_get_items_ids().returning(|_| {
        futures::stream::iter(vec![
            Ok(SourceItemId::new("1")),
            Err::<SourceItemId, BoxError>("list view threshold exceeded".into()),
            Ok(SourceItemId::new("3")),
        ])
        .boxed()
    });
    source.expect_count_items().returning(|_| Ok(None));

    let executor = executor(transformator(&[]));
    let process = executor.create_transformation_process().await.unwrap();
    process.start_process(Arc::new(source), target()).await.unwrap();
    let status = process.wait_for_completion().await.unwrap();
    assert_eq!((status.done, status.errors, status.total), (2, 1, Some(3)));
}

#[tokio::test]
async fn test_stop_aborts_running_process() {
    let started = Arc::new(Notify::new());
    let executor = executor(BlockingTransformator {
        started: started.clone(),
    });
    let process = executor.create_transformation_process().await.unwrap();
    process
        .start_process(source(vec!["1", "2"], Some(2)), target())
        .await
        .unwrap();

    started.notified().await;
    let status = process.stop_process().await.unwrap();

    assert_eq!(status.state, ProcessState::Aborted);
    assert_eq!(status.done, 0);
    let tasks = process.get_task_statuses(&TasksStatusQuery::all()).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].state, TaskState::Aborted);
    assert!(tasks[0].ended_at.is_some());
}

#[tokio::test]
async fn test_second_start_while_running_is_rejected() {
    let started = Arc::new(Notify::new());
    let executor = executor(BlockingTransformator {
        started: started.clone(),
    });
    let process = executor.create_transformation_process().await.unwrap();
    process
        .start_process(source(vec!["1"], Some(1)), target())
        .await
        .unwrap();
    started.notified().await;

    let err = process
        .start_process(source(vec!["1"], Some(1)), target())
        .await
        .unwrap_err();
    assert!(matches!(err, TransformationError::ProcessAlreadyRunning(id) if id == process.id()));
    process.stop_process().await.unwrap();
}

#[tokio::test]
async fn test_in_process_executor_loads_known_processes_only() {
    let executor = executor(transformator(&[]));
    let process = executor.create_transformation_process().await.unwrap();

    let loaded = executor.load_transformation_process(process.id()).await.unwrap();
    assert_eq!(loaded.id(), process.id());

    let err = executor
        .load_transformation_process(Uuid::new_v4())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransformationError::ProcessNotFound(_)));
}

#[tokio::test]
async fn test_long_running_process_resumes_after_restart() {
    let dir = tempdir().unwrap();
    let state = Arc::new(FileTransformationStateManager::new(dir.path()));

    let first = LongRunningTransformationExecutor::new(
        Arc::new(DefaultTransformationDistiller::new()),
        Arc::new(transformator(&[])),
        state.clone(),
    );
    let process = first.create_transformation_process().await.unwrap();
    let process_id = process.id();

    // A previous run completed item "1" before the host went down.
    let done = TransformationProcessTaskStatus::pending(process_id, Uuid::new_v4(), "1".into())
        .running()
        .completed(&page_url(&"1".into()));
    state.write_task_status(&done).await.unwrap();
    drop(first);

    let mut transformator = MockPageTransformator::new();
    transformator
        .expect_transform()
        .withf(|task, _| task.source_item_id().as_str() == "2")
        .times(1)
        .returning(|task, _| Ok(page_url(task.source_item_id())));
    let second = LongRunningTransformationExecutor::new(
        Arc::new(DefaultTransformationDistiller::new()),
        Arc::new(transformator),
        state.clone(),
    );

    let resumed = second.load_transformation_process(process_id).await.unwrap();
    resumed
        .start_process(source(vec!["1", "2"], Some(2)), target())
        .await
        .unwrap();
    let status = resumed.wait_for_completion().await.unwrap();

    assert_eq!(status.state, ProcessState::Completed);
    assert_eq!((status.done, status.errors), (2, 0));
    let persisted = state.read_process_status(process_id).await.unwrap().unwrap();
    assert_eq!(persisted, status);
}

#[tokio::test]
async fn test_long_running_executor_rejects_unknown_process() {
    let dir = tempdir().unwrap();
    let executor = LongRunningTransformationExecutor::new(
        Arc::new(DefaultTransformationDistiller::new()),
        Arc::new(transformator(&[])),
        Arc::new(FileTransformationStateManager::new(dir.path())),
    );
    let err = executor
        .load_transformation_process(Uuid::new_v4())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransformationError::ProcessNotFound(_)));
}

#[tokio::test]
async fn test_distiller_stops_at_cancellation() {
    use page_transform::contract::TransformationDistiller;

    let token = CancellationToken::new();
    let mut tasks = DefaultTransformationDistiller::new().get_page_transformation_tasks(
        source(vec!["1", "2"], None),
        target(),
        token.clone(),
    );
    let first = tasks.next().await.unwrap().unwrap();
    assert_eq!(first.source_item_id().as_str(), "1");
    assert!(first.target_page_uri().is_none());

    token.cancel();
    assert!(tasks.next().await.is_none());
}
