/// # page-transform CLI interface
///
/// Command parsing and orchestration for the `page-transform` binary. The
/// pipeline itself lives in the `page-transform` library; this module wires
/// the local folder collaborators from [`crate::local`] and a file-backed
/// state store to it.
///
/// ## Commands
/// - `transform --config <file> [--process-id <uuid>]` runs a batch, or
///   resumes a persisted one, and prints a one-line summary.
/// - `status --config <file> --process-id <uuid>` prints a persisted
///   process status and its faulted tasks.
///
/// Ctrl-C during `transform` stops the process; the tasks that finished stay
/// recorded and a later `--process-id` run picks up the rest.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use page_transform::contract::{ProgressSink, TransformationExecutor};
use page_transform::distiller::DefaultTransformationDistiller;
use page_transform::process::LongRunningTransformationExecutor;
use page_transform::state::FileTransformationStateManager;
use page_transform::status::{
    ProcessState, TaskState, TasksStatusQuery, TransformationProcessStatus,
};
use page_transform::transformator::DefaultPageTransformator;
use std::path::PathBuf;
use uuid::Uuid;

use crate::load_config::{load_config, CliConfig};
use crate::local::{FolderSourceProvider, FolderTargetContext};

/// CLI for page-transform: turn classic page exports into modern pages.
#[derive(Parser)]
#[clap(
    name = "page-transform",
    version,
    about = "Transform exported classic SharePoint pages into modern client-side pages"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transform every page in the configured source folder
    Transform {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Resume a persisted process instead of creating a new one
        #[clap(long)]
        process_id: Option<Uuid>,
    },
    /// Show the persisted status of a process
    Status {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        process_id: Uuid,
    },
}

/// Logs every progress snapshot.
struct TracingProgressSink;

#[async_trait]
impl ProgressSink for TracingProgressSink {
    async fn report(&self, status: &TransformationProcessStatus) {
        tracing::info!(
            process_id = %status.process_id,
            done = status.done,
            errors = status.errors,
            total = ?status.total,
            percentage = ?status.percentage,
            state = %status.state,
            "[PROGRESS] Process status updated"
        );
    }
}

fn executor(config: &CliConfig) -> LongRunningTransformationExecutor {
    LongRunningTransformationExecutor::new(
        Arc::new(DefaultTransformationDistiller::new()),
        Arc::new(DefaultPageTransformator::from_options(config.options.clone())),
        Arc::new(FileTransformationStateManager::new(&config.state_folder)),
    )
    .with_progress_sink(Arc::new(TracingProgressSink))
}

fn summary(status: &TransformationProcessStatus) -> String {
    let total = status
        .total
        .map_or_else(|| "?".to_string(), |total| total.to_string());
    format!(
        "Process {} {}: {} done, {} failed, {} total",
        status.process_id, status.state, status.done, status.errors, total
    )
}

async fn transform(config: CliConfig, process_id: Option<Uuid>) -> Result<()> {
    let executor = executor(&config);
    let process = match process_id {
        Some(id) => {
            tracing::info!(process_id = %id, "Resuming transformation process");
            executor.load_transformation_process(id).await?
        }
        None => executor.create_transformation_process().await?,
    };

    let source = Arc::new(FolderSourceProvider::new(&config.source_folder));
    let target = Arc::new(FolderTargetContext::new(
        &config.target_folder,
        config.target_site_url.clone(),
        config.target_site_template.clone(),
    ));
    process.start_process(source, target).await?;

    let status = tokio::select! {
        status = process.wait_for_completion() => status?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::warn!(process_id = %process.id(), "Interrupted, stopping transformation process");
            process.stop_process().await?
        }
    };

    println!("{}", summary(&status));
    if status.state != ProcessState::Completed {
        return Err(anyhow!(
            "Process {} ended in state {}",
            status.process_id,
            status.state
        ));
    }
    Ok(())
}

async fn status(config: CliConfig, process_id: Uuid) -> Result<()> {
    let process = executor(&config)
        .load_transformation_process(process_id)
        .await?;
    let status = process.get_status().await?;
    println!("{}", summary(&status));

    let faulted = process
        .get_task_statuses(&TasksStatusQuery::with_state(TaskState::Faulted))
        .await?;
    for task in faulted {
        println!(
            "  {} failed: {}",
            task.source_item_id,
            task.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Async CLI entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Transform { config, process_id } => {
            let config = load_config(config)?;
            tracing::info!(command = "transform", "Starting page transformation");
            match transform(config, process_id).await {
                Ok(()) => {
                    tracing::info!(command = "transform", "Page transformation complete");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "transform", error = %e, "Page transformation failed");
                    Err(e)
                }
            }
        }
        Commands::Status { config, process_id } => {
            let config = load_config(config)?;
            status(config, process_id).await
        }
    }
}
