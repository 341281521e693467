//! Run-wide configuration, supplied once when the pipeline is built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::page::PageHeaderKind;

/// Prefix put in front of generated page names unless the source name is kept.
pub const DEFAULT_TARGET_PAGE_PREFIX: &str = "Migrated_";

/// One source-to-target URL prefix rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub source: String,
    pub target: String,
}

/// Options read by every stage; never mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageTransformationOptions {
    /// Replace an existing target page with the same name.
    pub overwrite: bool,
    pub keep_page_specific_permissions: bool,
    pub keep_page_creation_modification_information: bool,
    pub copy_page_metadata: bool,
    pub publish_page: bool,
    /// Promote the page to a news post. Implies `publish_page`.
    pub post_as_news: bool,
    pub disable_page_comments: bool,
    pub keep_source_page_author_in_page_header: bool,
    pub set_author_in_page_header: bool,
    pub replace_home_page_with_default_home_page: bool,
    pub remove_empty_sections_and_columns: bool,
    pub target_page_takes_source_page_name: bool,
    pub target_page_prefix: String,
    pub target_page_folder: Option<String>,
    pub handle_wiki_images_and_videos: bool,
    pub add_table_list_image_as_image_web_part: bool,
    pub use_image_placeholders: bool,
    pub skip_hidden_web_parts: bool,
    pub skip_url_rewrite: bool,
    pub skip_telemetry: bool,
    pub page_header: PageHeaderKind,
    pub url_mappings: Vec<UrlMapping>,
    /// URL of the classic site; links under it are moved under the target site.
    pub source_site_url: Option<String>,
    /// Source principal to target principal.
    pub user_mappings: BTreeMap<String, String>,
    /// Source term id to target term id.
    pub term_mappings: BTreeMap<String, String>,
    /// Source field name to target field name.
    pub metadata_field_mappings: BTreeMap<String, String>,
    /// Free-form properties available as `{Name}` tokens in mapping templates.
    pub mapping_properties: BTreeMap<String, String>,
}

impl Default for PageTransformationOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            keep_page_specific_permissions: true,
            keep_page_creation_modification_information: false,
            copy_page_metadata: true,
            publish_page: false,
            post_as_news: false,
            disable_page_comments: false,
            keep_source_page_author_in_page_header: false,
            set_author_in_page_header: false,
            replace_home_page_with_default_home_page: false,
            remove_empty_sections_and_columns: true,
            target_page_takes_source_page_name: false,
            target_page_prefix: DEFAULT_TARGET_PAGE_PREFIX.to_string(),
            target_page_folder: None,
            handle_wiki_images_and_videos: true,
            add_table_list_image_as_image_web_part: true,
            use_image_placeholders: false,
            skip_hidden_web_parts: true,
            skip_url_rewrite: false,
            skip_telemetry: false,
            page_header: PageHeaderKind::None,
            url_mappings: Vec::new(),
            source_site_url: None,
            user_mappings: BTreeMap::new(),
            term_mappings: BTreeMap::new(),
            metadata_field_mappings: BTreeMap::new(),
            mapping_properties: BTreeMap::new(),
        }
    }
}

impl PageTransformationOptions {
    /// Whether the author should be stamped into the page header.
    pub fn wants_author_in_header(&self) -> bool {
        self.keep_source_page_author_in_page_header || self.set_author_in_page_header
    }

    pub fn trace_loaded(&self) {
        info!(
            overwrite = self.overwrite,
            publish_page = self.publish_page,
            post_as_news = self.post_as_news,
            handle_wiki_images_and_videos = self.handle_wiki_images_and_videos,
            target_page_prefix = %self.target_page_prefix,
            "Loaded PageTransformationOptions"
        );
        debug!(?self, "PageTransformationOptions loaded (full debug)");
    }
}
