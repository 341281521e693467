//! Transformation processes: batch runs over a source, with status tracking.
//!
//! A [`TransformationProcess`] moves `Pending -> Running -> Completed | Aborted`.
//! `start_process` spawns the run loop on the tokio runtime and returns at
//! once; callers poll [`TransformationProcess::get_status`], subscribe through
//! a [`ProgressSink`], or await [`TransformationProcess::wait_for_completion`].
//!
//! Tasks run one at a time in the order the distiller yields them. A failed
//! task is recorded as `Faulted` and counted in `errors`; it never stops the
//! batch. Cancellation drops the task in flight, records it as `Aborted` and
//! moves the process to `Aborted`.
//!
//! Starting a process that already has `Completed` task records skips the
//! source items those records name and seeds `done` with their count. That is
//! how a [`LongRunningTransformationExecutor`] resumes after a restart.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::contract::{
    PageTransformator, ProgressSink, SourceProvider, TargetContext, TransformationDistiller,
    TransformationExecutor, TransformationStateManager,
};
use crate::distiller::DefaultTransformationDistiller;
use crate::error::{Result, TransformationError};
use crate::model::{PageTransformationTask, SourceItemId};
use crate::options::PageTransformationOptions;
use crate::state::InMemoryTransformationStateManager;
use crate::status::{
    ProcessState, TaskState, TasksStatusQuery, TransformationProcessStatus,
    TransformationProcessTaskStatus,
};
use crate::transformator::DefaultPageTransformator;

/// Handle on a spawned run loop; `outcome` turns `Some` once the loop settles.
#[derive(Clone)]
struct ActiveRun {
    token: CancellationToken,
    outcome: watch::Receiver<Option<TransformationProcessStatus>>,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        let settled = self.outcome.borrow().is_some();
        // A dropped sender without a status means the loop panicked.
        !settled && self.outcome.has_changed().is_ok()
    }

    async fn settle(&self, process_id: Uuid) -> Result<TransformationProcessStatus> {
        let mut outcome = self.outcome.clone();
        let status = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| TransformationError::RunLoop(process_id))?;
        status.clone().ok_or(TransformationError::RunLoop(process_id))
    }
}

/// Collaborators shared by the run loop.
#[derive(Clone)]
struct Pipeline {
    process_id: Uuid,
    distiller: Arc<dyn TransformationDistiller>,
    transformator: Arc<dyn PageTransformator>,
    state: Arc<dyn TransformationStateManager>,
    progress: Vec<Arc<dyn ProgressSink>>,
}

pub struct TransformationProcess {
    pipeline: Pipeline,
    run: Mutex<Option<ActiveRun>>,
}

impl TransformationProcess {
    pub fn new(
        process_id: Uuid,
        distiller: Arc<dyn TransformationDistiller>,
        transformator: Arc<dyn PageTransformator>,
        state: Arc<dyn TransformationStateManager>,
        progress: Vec<Arc<dyn ProgressSink>>,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                process_id,
                distiller,
                transformator,
                state,
                progress,
            },
            run: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.pipeline.process_id
    }

    /// Persists the initial `Pending` status.
    pub async fn initialize(&self) -> Result<()> {
        self.pipeline
            .state
            .write_process_status(&TransformationProcessStatus::pending(self.id()))
            .await
    }

    /// Starts consuming the source in the background.
    pub async fn start_process(
        &self,
        source_provider: Arc<dyn SourceProvider>,
        target_context: Arc<dyn TargetContext>,
    ) -> Result<()> {
        let mut run = self.run.lock().await;
        if run.as_ref().is_some_and(ActiveRun::is_running) {
            return Err(TransformationError::ProcessAlreadyRunning(self.id()));
        }

        let token = CancellationToken::new();
        let pipeline = self.pipeline.clone();
        let completed = pipeline.completed_source_items().await?;
        let total = match source_provider.count_items(&token).await {
            Ok(total) => total,
            Err(e) => {
                warn!(process_id = %self.id(), error = %e, "[PROCESS] Counting source items failed, total unknown");
                None
            }
        };

        let running = TransformationProcessStatus::new(
            self.id(),
            completed.len(),
            0,
            total,
            ProcessState::Running,
        );
        pipeline.publish(&running).await;
        info!(
            process_id = %self.id(),
            total = ?total,
            resumed = completed.len(),
            "[PROCESS] Transformation process started"
        );

        let loop_token = token.clone();
        let (sender, outcome) = watch::channel(None);
        tokio::spawn(async move {
            let status = pipeline
                .run(source_provider, target_context, loop_token, completed, total)
                .await;
            sender.send_replace(Some(status));
        });
        *run = Some(ActiveRun { token, outcome });
        Ok(())
    }

    /// Requests cancellation and waits for the run loop to settle.
    pub async fn stop_process(&self) -> Result<TransformationProcessStatus> {
        let active = self.run.lock().await.clone();
        match active {
            Some(active) => {
                info!(process_id = %self.id(), "[PROCESS] Stop requested");
                active.token.cancel();
                active.settle(self.id()).await
            }
            None => self.get_status().await,
        }
    }

    /// Waits for the current run, if any, and returns the final status.
    ///
    /// Any number of callers may wait at once, alongside a `stop_process`.
    pub async fn wait_for_completion(&self) -> Result<TransformationProcessStatus> {
        let active = self.run.lock().await.clone();
        match active {
            Some(active) => active.settle(self.id()).await,
            None => self.get_status().await,
        }
    }

    pub async fn get_status(&self) -> Result<TransformationProcessStatus> {
        self.pipeline
            .state
            .read_process_status(self.id())
            .await?
            .ok_or(TransformationError::ProcessNotFound(self.id()))
    }

    pub async fn get_task_status(
        &self,
        task_id: Uuid,
    ) -> Result<Option<TransformationProcessTaskStatus>> {
        self.pipeline.state.read_task_status(self.id(), task_id).await
    }

    pub async fn get_task_statuses(
        &self,
        query: &TasksStatusQuery,
    ) -> Result<Vec<TransformationProcessTaskStatus>> {
        self.pipeline
            .state
            .query_task_statuses(self.id(), query)
            .await
    }
}

impl Pipeline {
    async fn completed_source_items(&self) -> Result<HashSet<SourceItemId>> {
        Ok(self
            .state
            .query_task_statuses(self.process_id, &TasksStatusQuery::with_state(TaskState::Completed))
            .await?
            .into_iter()
            .map(|status| status.source_item_id)
            .collect())
    }

    /// Persists the snapshot, then hands it to every progress sink.
    async fn publish(&self, status: &TransformationProcessStatus) {
        if let Err(e) = self.state.write_process_status(status).await {
            error!(process_id = %self.process_id, error = %e, "[PROCESS] Writing process status failed");
        }
        for sink in &self.progress {
            sink.report(status).await;
        }
    }

    async fn persist(&self, status: &TransformationProcessTaskStatus) {
        if let Err(e) = self.state.write_task_status(status).await {
            error!(
                process_id = %self.process_id,
                task_id = %status.task_id,
                error = %e,
                "[PROCESS] Writing task status failed"
            );
        }
    }

    async fn finish(
        &self,
        done: usize,
        errors: usize,
        total: Option<usize>,
        state: ProcessState,
    ) -> TransformationProcessStatus {
        let status = TransformationProcessStatus::new(self.process_id, done, errors, total, state);
        self.publish(&status).await;
        info!(
            process_id = %self.process_id,
            done,
            errors,
            state = %state,
            "[PROCESS] Transformation process finished"
        );
        status
    }

    async fn run(
        self,
        source_provider: Arc<dyn SourceProvider>,
        target_context: Arc<dyn TargetContext>,
        token: CancellationToken,
        completed: HashSet<SourceItemId>,
        total: Option<usize>,
    ) -> TransformationProcessStatus {
        let mut done = completed.len();
        let mut errors = 0;
        let mut tasks = self.distiller.get_page_transformation_tasks(
            source_provider,
            target_context,
            token.clone(),
        );

        loop {
            if total.is_some_and(|total| done + errors >= total) {
                break;
            }
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return self.finish(done, errors, total, ProcessState::Aborted).await;
                }
                next = tasks.next() => next,
            };
            let task = match next {
                None => break,
                Some(Ok(task)) => task,
                Some(Err(e)) if e.is_cancellation() => {
                    return self.finish(done, errors, total, ProcessState::Aborted).await;
                }
                Some(Err(e)) => {
                    error!(process_id = %self.process_id, error = %e, "[PROCESS] Task could not be created");
                    errors += 1;
                    self.publish(&TransformationProcessStatus::new(
                        self.process_id,
                        done,
                        errors,
                        total,
                        ProcessState::Running,
                    ))
                    .await;
                    continue;
                }
            };

            if completed.contains(task.source_item_id()) {
                debug!(source_item_id = %task.source_item_id(), "[PROCESS] Already completed, skipped");
                continue;
            }

            match self.run_task(&task, &token).await {
                TaskState::Completed => done += 1,
                TaskState::Aborted if token.is_cancelled() => {
                    return self.finish(done, errors, total, ProcessState::Aborted).await;
                }
                _ => errors += 1,
            }
            self.publish(&TransformationProcessStatus::new(
                self.process_id,
                done,
                errors,
                total,
                ProcessState::Running,
            ))
            .await;
        }

        let total = Some(total.unwrap_or(done + errors));
        self.finish(done, errors, total, ProcessState::Completed).await
    }

    /// Runs one task and records its outcome; returns the terminal task state.
    async fn run_task(&self, task: &PageTransformationTask, token: &CancellationToken) -> TaskState {
        let pending = TransformationProcessTaskStatus::pending(
            self.process_id,
            task.id(),
            task.source_item_id().clone(),
        );
        self.persist(&pending).await;
        let running = pending.running();
        self.persist(&running).await;

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.transformator.transform(task, token) => Some(result),
        };

        let finished = match outcome {
            Some(Ok(url)) => running.completed(&url),
            None => running.aborted(),
            Some(Err(e)) if e.is_cancellation() => running.aborted(),
            Some(Err(e)) => {
                error!(
                    process_id = %self.process_id,
                    task_id = %task.id(),
                    source_item_id = %task.source_item_id(),
                    error = %e,
                    "[PROCESS] Page transformation failed"
                );
                running.faulted(&e)
            }
        };
        self.persist(&finished).await;
        finished.state
    }
}

/// Keeps processes and their status in memory for the lifetime of the executor.
pub struct InProcessTransformationExecutor {
    distiller: Arc<dyn TransformationDistiller>,
    transformator: Arc<dyn PageTransformator>,
    progress: Vec<Arc<dyn ProgressSink>>,
    processes: DashMap<Uuid, Arc<TransformationProcess>>,
}

impl InProcessTransformationExecutor {
    pub fn new(
        distiller: Arc<dyn TransformationDistiller>,
        transformator: Arc<dyn PageTransformator>,
    ) -> Self {
        Self {
            distiller,
            transformator,
            progress: Vec::new(),
            processes: DashMap::new(),
        }
    }

    /// Default distiller and transformator built from `options`.
    pub fn from_options(options: PageTransformationOptions) -> Self {
        Self::new(
            Arc::new(DefaultTransformationDistiller::new()),
            Arc::new(DefaultPageTransformator::from_options(options)),
        )
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress.push(sink);
        self
    }
}

#[async_trait]
impl TransformationExecutor for InProcessTransformationExecutor {
    async fn create_transformation_process(&self) -> Result<Arc<TransformationProcess>> {
        let process = Arc::new(TransformationProcess::new(
            Uuid::new_v4(),
            self.distiller.clone(),
            self.transformator.clone(),
            Arc::new(InMemoryTransformationStateManager::new()),
            self.progress.clone(),
        ));
        process.initialize().await?;
        self.processes.insert(process.id(), process.clone());
        debug!(process_id = %process.id(), "[PROCESS] In-process transformation process created");
        Ok(process)
    }

    async fn load_transformation_process(
        &self,
        process_id: Uuid,
    ) -> Result<Arc<TransformationProcess>> {
        self.processes
            .get(&process_id)
            .map(|p| p.value().clone())
            .ok_or(TransformationError::ProcessNotFound(process_id))
    }
}

/// Keeps status in an injected state manager so processes outlive the executor.
pub struct LongRunningTransformationExecutor {
    distiller: Arc<dyn TransformationDistiller>,
    transformator: Arc<dyn PageTransformator>,
    state: Arc<dyn TransformationStateManager>,
    progress: Vec<Arc<dyn ProgressSink>>,
}

impl LongRunningTransformationExecutor {
    pub fn new(
        distiller: Arc<dyn TransformationDistiller>,
        transformator: Arc<dyn PageTransformator>,
        state: Arc<dyn TransformationStateManager>,
    ) -> Self {
        Self {
            distiller,
            transformator,
            state,
            progress: Vec::new(),
        }
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress.push(sink);
        self
    }

    fn process(&self, process_id: Uuid) -> TransformationProcess {
        TransformationProcess::new(
            process_id,
            self.distiller.clone(),
            self.transformator.clone(),
            self.state.clone(),
            self.progress.clone(),
        )
    }
}

#[async_trait]
impl TransformationExecutor for LongRunningTransformationExecutor {
    async fn create_transformation_process(&self) -> Result<Arc<TransformationProcess>> {
        let process = self.process(Uuid::new_v4());
        process.initialize().await?;
        debug!(process_id = %process.id(), "[PROCESS] Long-running transformation process created");
        Ok(Arc::new(process))
    }

    async fn load_transformation_process(
        &self,
        process_id: Uuid,
    ) -> Result<Arc<TransformationProcess>> {
        let status = self
            .state
            .read_process_status(process_id)
            .await?
            .ok_or(TransformationError::ProcessNotFound(process_id))?;
        info!(
            process_id = %process_id,
            state = %status.state,
            done = status.done,
            errors = status.errors,
            "[PROCESS] Transformation process loaded"
        );
        Ok(Arc::new(self.process(process_id)))
    }
}
