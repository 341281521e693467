//! Page transformator: runs one task through URI resolution, pre hooks,
//! mapping, generation, telemetry and post hooks, in that order.
//!
//! Each call runs inside a `page_transformation` span carrying a fresh
//! correlation id. Cancellation is checked after the pre hooks, after mapping,
//! after generation and after the post hooks. A stage already running when
//! cancellation is requested finishes first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};
use url::Url;
use uuid::Uuid;

use crate::contract::{
    MappingProvider, PageGenerator, PageTransformator, PostTransformation, PreTransformation,
    TargetContext, TargetPageUriResolver, TelemetrySink,
};
use crate::error::{Result, TransformationError};
use crate::generator::DefaultPageGenerator;
use crate::mapping::ClassicPageMappingProvider;
use crate::model::{PageTransformationContext, PageTransformationTask, SourceItem};
use crate::options::PageTransformationOptions;
use crate::telemetry::{TracingTelemetrySink, TransformationOutcome, TransformationTelemetry};

const SITE_PAGES_LIBRARY: &str = "SitePages";

/// Places generated pages in the site pages library of the target site,
/// below the configured folder, named after the source page.
#[derive(Debug, Clone)]
pub struct DefaultTargetPageUriResolver {
    options: Arc<PageTransformationOptions>,
}

impl DefaultTargetPageUriResolver {
    pub fn new(options: Arc<PageTransformationOptions>) -> Self {
        Self { options }
    }

    pub fn page_name(&self, item: &SourceItem) -> String {
        let name = if self.options.target_page_takes_source_page_name {
            item.base_name().to_string()
        } else {
            format!("{}{}", self.options.target_page_prefix, item.base_name())
        };
        format!("{name}.aspx")
    }
}

#[async_trait]
impl TargetPageUriResolver for DefaultTargetPageUriResolver {
    async fn resolve(
        &self,
        source_item: &SourceItem,
        target_context: &Arc<dyn TargetContext>,
        _token: &CancellationToken,
    ) -> Result<Url> {
        let mut site = target_context.site_url().clone();
        if !site.path().ends_with('/') {
            let path = format!("{}/", site.path());
            site.set_path(&path);
        }
        let mut relative = format!("{SITE_PAGES_LIBRARY}/");
        if let Some(folder) = self
            .options
            .target_page_folder
            .as_deref()
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty())
        {
            relative.push_str(folder);
            relative.push('/');
        }
        relative.push_str(&self.page_name(source_item));
        Ok(site.join(&relative)?)
    }
}

pub struct DefaultPageTransformator {
    options: Arc<PageTransformationOptions>,
    mapping: Arc<dyn MappingProvider>,
    generator: Arc<dyn PageGenerator>,
    resolver: Arc<dyn TargetPageUriResolver>,
    telemetry: Arc<dyn TelemetrySink>,
    pre_transformations: Vec<Arc<dyn PreTransformation>>,
    post_transformations: Vec<Arc<dyn PostTransformation>>,
}

impl DefaultPageTransformator {
    pub fn new(
        options: Arc<PageTransformationOptions>,
        mapping: Arc<dyn MappingProvider>,
        generator: Arc<dyn PageGenerator>,
    ) -> Self {
        Self {
            resolver: Arc::new(DefaultTargetPageUriResolver::new(options.clone())),
            options,
            mapping,
            generator,
            telemetry: Arc::new(TracingTelemetrySink),
            pre_transformations: Vec::new(),
            post_transformations: Vec::new(),
        }
    }

    /// Classic page mapping, default generator, `tracing` telemetry.
    pub fn from_options(options: PageTransformationOptions) -> Self {
        let mapping = Arc::new(ClassicPageMappingProvider::new(&options));
        Self::new(Arc::new(options), mapping, Arc::new(DefaultPageGenerator::new()))
    }

    pub fn with_target_page_uri_resolver(mut self, resolver: Arc<dyn TargetPageUriResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Registers a pre hook; hooks run in registration order.
    pub fn with_pre_transformation(mut self, hook: Arc<dyn PreTransformation>) -> Self {
        self.pre_transformations.push(hook);
        self
    }

    /// Registers a post hook; hooks run in registration order.
    pub fn with_post_transformation(mut self, hook: Arc<dyn PostTransformation>) -> Self {
        self.post_transformations.push(hook);
        self
    }

    pub fn options(&self) -> &Arc<PageTransformationOptions> {
        &self.options
    }

    fn record(
        &self,
        correlation_id: Uuid,
        task: &PageTransformationTask,
        started: Instant,
        outcome: TransformationOutcome,
        properties: BTreeMap<String, String>,
    ) {
        if self.options.skip_telemetry {
            return;
        }
        self.telemetry.record(&TransformationTelemetry {
            correlation_id,
            task_id: task.id(),
            source_item_id: task.source_item_id().clone(),
            duration: started.elapsed(),
            outcome,
            properties,
        });
    }

    /// Runs everything up to and including generation.
    async fn map_and_generate(
        &self,
        task: &PageTransformationTask,
        token: &CancellationToken,
        properties: &mut BTreeMap<String, String>,
    ) -> Result<(PageTransformationContext, Url)> {
        check_cancelled(token)?;
        let source_item = task
            .source_provider()
            .get_item(task.source_item_id(), token)
            .await
            .map_err(TransformationError::SourceProvider)?;

        let target_page_uri = match task.target_page_uri() {
            Some(uri) => uri.clone(),
            None => {
                self.resolver
                    .resolve(&source_item, task.target_context(), token)
                    .await?
            }
        };
        debug!(target_page_uri = %target_page_uri, "[TRANSFORM] Target page URI resolved");

        let context = PageTransformationContext {
            task: task.clone(),
            source_item,
            target_page_uri,
            options: self.options.clone(),
        };

        for hook in &self.pre_transformations {
            hook.pre_transform(&context, token)
                .await
                .map_err(|e| TransformationError::hook("pre-transformation", e))?;
        }
        check_cancelled(token)?;

        let mapping_output = self.mapping.map(&context, token).await?;
        properties.extend(mapping_output.telemetry_properties.clone());
        check_cancelled(token)?;

        let generated = self
            .generator
            .generate(&context, &mapping_output, &context.target_page_uri, token)
            .await?;
        properties.extend(generated.telemetry_properties);
        Ok((context, generated.generated_page_url))
    }
}

fn check_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(TransformationError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl PageTransformator for DefaultPageTransformator {
    async fn transform(
        &self,
        task: &PageTransformationTask,
        token: &CancellationToken,
    ) -> Result<Url> {
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "page_transformation",
            %correlation_id,
            task_id = %task.id(),
            source_item_id = %task.source_item_id()
        );

        async move {
            info!("[TRANSFORM] Starting page transformation");
            let started = Instant::now();
            let mut properties = BTreeMap::new();

            let (context, generated_page_url) =
                match self.map_and_generate(task, token, &mut properties).await {
                    Ok(generated) => generated,
                    Err(e) if e.is_cancellation() => {
                        info!("[TRANSFORM] Page transformation cancelled");
                        return Err(e);
                    }
                    Err(e) => {
                        self.record(
                            correlation_id,
                            task,
                            started,
                            TransformationOutcome::Failed {
                                message: e.to_string(),
                            },
                            properties,
                        );
                        return Err(e);
                    }
                };

            self.record(
                correlation_id,
                task,
                started,
                TransformationOutcome::Succeeded,
                properties,
            );
            check_cancelled(token)?;

            for hook in &self.post_transformations {
                hook.post_transform(&context, &generated_page_url, token)
                    .await
                    .map_err(|e| TransformationError::hook("post-transformation", e))?;
            }
            check_cancelled(token)?;

            info!(url = %generated_page_url, "[TRANSFORM] Page transformation completed");
            Ok(generated_page_url)
        }
        .instrument(span)
        .await
    }
}
