#![allow(unused)]

//! # contract: every pluggable seam of the transformation pipeline
//!
//! The pipeline only talks to the outside world, and to its own swappable
//! stages, through the traits in this module:
//!
//! - [`SourceProvider`] enumerates and fetches classic pages.
//! - [`TargetContext`] is the handle on the target site (pages, users, publishing).
//! - [`MappingProvider`] and the per-concern providers ([`WebPartMappingProvider`],
//!   [`PageLayoutMappingProvider`], [`TaxonomyMappingProvider`],
//!   [`MetadataMappingProvider`], [`UrlMappingProvider`], [`UserMappingProvider`])
//!   turn source constructs into target constructs.
//! - [`PageGenerator`] writes the target page.
//! - [`PreTransformation`] / [`PostTransformation`] hooks run around each task.
//! - [`PageTransformator`], [`TransformationDistiller`] and
//!   [`TargetPageUriResolver`] are the orchestration stages.
//! - [`TransformationExecutor`] creates and loads batch processes.
//! - [`TransformationStateManager`], [`ProgressSink`] and [`TelemetrySink`]
//!   receive status and observability data.
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall`; the `test-export-mocks` feature
//! (on by default) exports the generated `Mock*` types to integration tests.
//!
//! ## Errors
//! External collaborators ([`SourceProvider`], [`TargetContext`]) return boxed
//! errors that the pipeline wraps into [`TransformationError`]; in-crate stages
//! return [`crate::error::Result`] directly.
//!
//! [`TransformationError`]: crate::error::TransformationError

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use mockall::{automock, predicate::*};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::error::{BoxError, Result};
use crate::layout::PageLayoutDescriptor;
use crate::model::{
    FieldValue, PageTransformationContext, PageTransformationTask, RoleAssignment, SourceItem,
    SourceItemId, TaxonomyTerm, WebPartEntity,
};
use crate::page::{
    CanvasControl, ClientSidePage, MappingProviderOutput, PageGeneratorOutput, TargetUser,
};
use crate::process::TransformationProcess;
use crate::status::{
    TasksStatusQuery, TransformationProcessStatus, TransformationProcessTaskStatus,
};
use crate::telemetry::TransformationTelemetry;

/// Supplies the classic pages to migrate.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Lazily enumerates the ids of every item to transform.
    fn get_items_ids(
        &self,
        token: &CancellationToken,
    ) -> BoxStream<'static, std::result::Result<SourceItemId, BoxError>>;

    /// Fetches one item by id.
    async fn get_item(
        &self,
        id: &SourceItemId,
        token: &CancellationToken,
    ) -> std::result::Result<SourceItem, BoxError>;

    /// Number of items the enumeration will yield, when known up front.
    async fn count_items(
        &self,
        token: &CancellationToken,
    ) -> std::result::Result<Option<usize>, BoxError>;
}

/// Handle on the target site. The transport behind it is up to the implementor.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TargetContext: Send + Sync {
    /// Absolute URL of the target site, ending with `/`.
    fn site_url(&self) -> &Url;

    /// Web template of the target site, e.g. `STS#3`.
    async fn get_web_template(
        &self,
        token: &CancellationToken,
    ) -> std::result::Result<String, BoxError>;

    async fn page_exists(
        &self,
        page_url: &Url,
        token: &CancellationToken,
    ) -> std::result::Result<bool, BoxError>;

    /// Creates (or replaces) the page and returns its final URL.
    async fn save_page(
        &self,
        page: &ClientSidePage,
        page_url: &Url,
        token: &CancellationToken,
    ) -> std::result::Result<Url, BoxError>;

    /// Resolves a principal against the target user store; `None` when unknown.
    async fn ensure_user(
        &self,
        principal: &str,
        token: &CancellationToken,
    ) -> std::result::Result<Option<TargetUser>, BoxError>;

    async fn set_page_fields(
        &self,
        page_url: &Url,
        fields: &BTreeMap<String, FieldValue>,
        token: &CancellationToken,
    ) -> std::result::Result<(), BoxError>;

    async fn set_page_permissions(
        &self,
        page_url: &Url,
        assignments: &[RoleAssignment],
        token: &CancellationToken,
    ) -> std::result::Result<(), BoxError>;

    async fn publish_page(
        &self,
        page_url: &Url,
        post_as_news: bool,
        token: &CancellationToken,
    ) -> std::result::Result<(), BoxError>;
}

/// Maps a whole source page onto the target page model.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MappingProvider: Send + Sync {
    async fn map(
        &self,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<MappingProviderOutput>;
}

/// Maps one source web part onto zero or more target controls.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WebPartMappingProvider: Send + Sync {
    async fn map_web_part(
        &self,
        web_part: &WebPartEntity,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<Vec<CanvasControl>>;
}

/// Maps the source page layout onto a layout descriptor.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageLayoutMappingProvider: Send + Sync {
    async fn map_page_layout(
        &self,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<PageLayoutDescriptor>;
}

/// Maps a source term onto a target term; `None` drops the term.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TaxonomyMappingProvider: Send + Sync {
    async fn map_term(
        &self,
        term: &TaxonomyTerm,
        token: &CancellationToken,
    ) -> Result<Option<TaxonomyTerm>>;
}

/// Maps a source metadata field onto a target field; `None` drops the field.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MetadataMappingProvider: Send + Sync {
    async fn map_field(
        &self,
        name: &str,
        value: &FieldValue,
        token: &CancellationToken,
    ) -> Result<Option<(String, FieldValue)>>;
}

/// Rewrites a URL found in source content.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UrlMappingProvider: Send + Sync {
    async fn map_url(
        &self,
        url: &str,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<String>;
}

/// Maps a source principal onto a target principal.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UserMappingProvider: Send + Sync {
    async fn map_user(&self, principal: &str, token: &CancellationToken) -> Result<String>;
}

/// Materializes the mapping output as a page in the target store.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageGenerator: Send + Sync {
    async fn generate(
        &self,
        context: &PageTransformationContext,
        mapping_output: &MappingProviderOutput,
        target_page_uri: &Url,
        token: &CancellationToken,
    ) -> Result<PageGeneratorOutput>;
}

/// Hook run before mapping. An error aborts the remaining hooks and the task.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PreTransformation: Send + Sync {
    async fn pre_transform(
        &self,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<()>;
}

/// Hook run after the page has been generated.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PostTransformation: Send + Sync {
    async fn post_transform(
        &self,
        context: &PageTransformationContext,
        generated_page_url: &Url,
        token: &CancellationToken,
    ) -> Result<()>;
}

/// Runs one task end to end and returns the generated page URL.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageTransformator: Send + Sync {
    async fn transform(
        &self,
        task: &PageTransformationTask,
        token: &CancellationToken,
    ) -> Result<Url>;
}

/// Decides where the generated page for a source item lives.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TargetPageUriResolver: Send + Sync {
    async fn resolve(
        &self,
        source_item: &SourceItem,
        target_context: &Arc<dyn TargetContext>,
        token: &CancellationToken,
    ) -> Result<Url>;
}

/// Turns a source enumeration into a lazy, single-pass sequence of tasks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait TransformationDistiller: Send + Sync {
    fn get_page_transformation_tasks(
        &self,
        source_provider: Arc<dyn SourceProvider>,
        target_context: Arc<dyn TargetContext>,
        token: CancellationToken,
    ) -> BoxStream<'static, Result<PageTransformationTask>>;
}

/// Durable store of process and task status snapshots.
///
/// Writes are whole-value and last-writer-wins per key.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TransformationStateManager: Send + Sync {
    async fn write_process_status(&self, status: &TransformationProcessStatus) -> Result<()>;

    async fn read_process_status(
        &self,
        process_id: Uuid,
    ) -> Result<Option<TransformationProcessStatus>>;

    /// Removes the process status and every task status recorded under it.
    async fn remove_process_status(&self, process_id: Uuid) -> Result<bool>;

    async fn write_task_status(&self, status: &TransformationProcessTaskStatus) -> Result<()>;

    async fn read_task_status(
        &self,
        process_id: Uuid,
        task_id: Uuid,
    ) -> Result<Option<TransformationProcessTaskStatus>>;

    async fn query_task_statuses(
        &self,
        process_id: Uuid,
        query: &TasksStatusQuery,
    ) -> Result<Vec<TransformationProcessTaskStatus>>;

    async fn remove_task_status(&self, process_id: Uuid, task_id: Uuid) -> Result<bool>;
}

/// Receives a fresh status snapshot after every task.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, status: &TransformationProcessStatus);
}

/// Receives the duration and outcome of every transformation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait TelemetrySink: Send + Sync {
    fn record(&self, telemetry: &TransformationTelemetry);
}

/// Creates and looks up transformation processes.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TransformationExecutor: Send + Sync {
    /// Creates a process in the `Pending` state.
    async fn create_transformation_process(&self) -> Result<Arc<TransformationProcess>>;

    /// Returns a known process; fails with `ProcessNotFound` otherwise.
    async fn load_transformation_process(
        &self,
        process_id: Uuid,
    ) -> Result<Arc<TransformationProcess>>;
}
