//! Default page generator: builds the modern page from the mapping output and
//! writes it to the target site.
//!
//! Saving the page is the only step that fails the task. Metadata copy,
//! permission copy and publishing run afterwards on a best-effort basis: a
//! failure is logged and listed in the `Warnings` telemetry property.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::contract::PageGenerator;
use crate::error::{Result, TransformationError};
use crate::model::PageTransformationContext;
use crate::page::{
    ClientSidePage, MappingProviderOutput, PageGeneratorOutput, PageHeader, PageHeaderLayout,
    PageLayoutType,
};

/// Web templates that can host modern pages.
pub const SUPPORTED_SITE_TEMPLATES: &[&str] = &[
    "STS#0",
    "STS#3",
    "GROUP#0",
    "SITEPAGEPUBLISHING#0",
    "BLANKINTERNET#0",
    "ENTERWIKI#0",
    "BDR#0",
    "DEV#0",
    "OFFILE#1",
    "EHS#1",
];

pub fn is_supported_site_template(template: &str) -> bool {
    SUPPORTED_SITE_TEMPLATES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(template.trim()))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPageGenerator;

impl DefaultPageGenerator {
    pub fn new() -> Self {
        Self
    }
}

/// Splits a page URL into the folder below `SitePages` and the file name.
fn page_location(site: &Url, page: &Url) -> (String, String) {
    let site_path = site.path().trim_end_matches('/');
    let relative = page
        .path()
        .strip_prefix(site_path)
        .unwrap_or(page.path())
        .trim_start_matches('/');
    let relative = relative
        .strip_prefix("SitePages/")
        .unwrap_or(relative);
    let decoded = percent_decode(relative);
    match decoded.rsplit_once('/') {
        Some((folder, name)) => (folder.to_string(), name.to_string()),
        None => (String::new(), decoded),
    }
}

/// Decodes `%XX` escapes in a URL path; `+` stays literal.
fn percent_decode(path: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(path.as_bytes())).into_owned()
}

#[async_trait]
impl PageGenerator for DefaultPageGenerator {
    async fn generate(
        &self,
        context: &PageTransformationContext,
        mapping_output: &MappingProviderOutput,
        target_page_uri: &Url,
        token: &CancellationToken,
    ) -> Result<PageGeneratorOutput> {
        if !target_page_uri.has_host() {
            return Err(TransformationError::MissingArgument("target page URI host"));
        }
        let target = context.target_context();
        let options = &context.options;
        let mut telemetry = BTreeMap::new();
        let mut warnings: Vec<&'static str> = Vec::new();

        let template = target
            .get_web_template(token)
            .await
            .map_err(TransformationError::TargetStore)?;
        if !is_supported_site_template(&template) {
            return Err(TransformationError::UnsupportedSiteTemplate { template });
        }
        telemetry.insert("SiteTemplate".to_string(), template);

        let mut publish_page = options.publish_page;
        if options.post_as_news && !publish_page {
            warn!("[GENERATE] post_as_news requires publish_page, publishing the page anyway");
            publish_page = true;
        }

        let exists = target
            .page_exists(target_page_uri, token)
            .await
            .map_err(TransformationError::TargetStore)?;
        if exists && !options.overwrite {
            return Err(TransformationError::PageAlreadyExists {
                url: target_page_uri.to_string(),
            });
        }
        if exists {
            info!(url = %target_page_uri, "[GENERATE] Overwriting existing target page");
        }

        let (folder, name) = page_location(target.site_url(), target_page_uri);
        let mut page = if mapping_output.is_home_page && options.replace_home_page_with_default_home_page
        {
            info!("[GENERATE] Replacing source home page with the default home page");
            telemetry.insert("DefaultHomePage".to_string(), "true".to_string());
            ClientSidePage::default_home_page(name, folder)
        } else {
            let mut page = ClientSidePage::new(name, folder);
            page.header = PageHeader::from(&mapping_output.header);
            if options.wants_author_in_header() {
                stamp_author(&mut page, mapping_output, context, token, &mut warnings).await;
            }
            page.layout = PageLayoutType::Article;
            page.sections = mapping_output.sections.clone();
            page
        };
        page.title = mapping_output.title.clone();
        page.comments_disabled = options.disable_page_comments;

        if token.is_cancelled() {
            return Err(TransformationError::Cancelled);
        }
        let generated_page_url = target
            .save_page(&page, target_page_uri, token)
            .await
            .map_err(TransformationError::TargetStore)?;
        debug!(url = %generated_page_url, sections = page.sections.len(), "[GENERATE] Page saved");

        if options.copy_page_metadata || options.keep_page_creation_modification_information {
            if !mapping_output.fields.is_empty() {
                if let Err(e) = target
                    .set_page_fields(&generated_page_url, &mapping_output.fields, token)
                    .await
                {
                    warn!(error = %e, "[GENERATE] Copying page metadata failed");
                    warnings.push("metadata");
                }
            }
        }

        if options.keep_page_specific_permissions && !context.source_item.role_assignments.is_empty()
        {
            if let Err(e) = target
                .set_page_permissions(
                    &generated_page_url,
                    &context.source_item.role_assignments,
                    token,
                )
                .await
            {
                warn!(error = %e, "[GENERATE] Copying page permissions failed");
                warnings.push("permissions");
            }
        }

        if publish_page {
            if let Err(e) = target
                .publish_page(&generated_page_url, options.post_as_news, token)
                .await
            {
                warn!(error = %e, "[GENERATE] Publishing the page failed");
                warnings.push("publish");
            }
        }

        if !warnings.is_empty() {
            telemetry.insert("Warnings".to_string(), warnings.join(","));
        }
        telemetry.insert("SectionCount".to_string(), page.sections.len().to_string());
        info!(url = %generated_page_url, "[GENERATE] Target page generated");

        Ok(PageGeneratorOutput {
            generated_page_url,
            telemetry_properties: telemetry,
        })
    }
}

/// Puts the mapped author into a no-image header. Leaves the header alone
/// when the author cannot be resolved on the target.
async fn stamp_author(
    page: &mut ClientSidePage,
    mapping_output: &MappingProviderOutput,
    context: &PageTransformationContext,
    token: &CancellationToken,
    warnings: &mut Vec<&'static str>,
) {
    let Some(author) = mapping_output.author.as_deref() else {
        warn!("[GENERATE] No source author to put in the page header");
        return;
    };
    match context.target_context().ensure_user(author, token).await {
        Ok(Some(user)) => {
            page.header.layout = PageHeaderLayout::NoImage;
            page.header.authors = vec![user];
        }
        Ok(None) => {
            warn!(author, "[GENERATE] Header author not found on target");
            warnings.push("author");
        }
        Err(e) => {
            warn!(author, error = %e, "[GENERATE] Resolving header author failed");
            warnings.push("author");
        }
    }
}
