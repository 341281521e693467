//! Local folder collaborators: a [`SourceProvider`] over a folder of
//! `SourceItem` JSON files and a [`TargetContext`] that writes generated
//! pages as JSON below a target folder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use page_transform::contract::{SourceProvider, TargetContext};
use page_transform::error::BoxError;
use page_transform::model::{FieldValue, RoleAssignment, SourceItem, SourceItemId};
use page_transform::page::{ClientSidePage, TargetUser};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

const ITEM_EXTENSION: &str = "json";

/// Reads one `SourceItem` per `<id>.json` file; ids are the file stems.
pub struct FolderSourceProvider {
    folder: PathBuf,
}

impl FolderSourceProvider {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    fn item_path(&self, id: &SourceItemId) -> PathBuf {
        self.folder.join(format!("{id}.{ITEM_EXTENSION}"))
    }
}

/// Sorted file stems of the item files in `folder`.
async fn list_item_ids(folder: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut ids = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(ITEM_EXTENSION)
        {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

#[async_trait]
impl SourceProvider for FolderSourceProvider {
    fn get_items_ids(
        &self,
        token: &CancellationToken,
    ) -> BoxStream<'static, Result<SourceItemId, BoxError>> {
        let folder = self.folder.clone();
        let token = token.clone();
        stream! {
            match list_item_ids(&folder).await {
                Ok(ids) => {
                    debug!(folder = ?folder, count = ids.len(), "[SOURCE] Enumerated source items");
                    for id in ids {
                        if token.is_cancelled() {
                            break;
                        }
                        yield Ok(SourceItemId::new(id));
                    }
                }
                Err(e) => yield Err(BoxError::from(e)),
            }
        }
        .boxed()
    }

    async fn get_item(
        &self,
        id: &SourceItemId,
        _token: &CancellationToken,
    ) -> Result<SourceItem, BoxError> {
        let path = self.item_path(id);
        let content = tokio::fs::read(&path).await?;
        let mut item: SourceItem = serde_json::from_slice(&content)?;
        // The file name is the identity; a stale id inside the file loses.
        item.id = id.clone();
        Ok(item)
    }

    async fn count_items(&self, _token: &CancellationToken) -> Result<Option<usize>, BoxError> {
        Ok(Some(list_item_ids(&self.folder).await?.len()))
    }
}

/// Target "site" backed by a local folder.
///
/// A page at `<site_url>SitePages/Foo.aspx` is written to
/// `<folder>/SitePages/Foo.aspx.json`; fields, permissions and publishing
/// state go into `.fields.json`, `.permissions.json` and `.publish.json`
/// files next to it.
pub struct FolderTargetContext {
    folder: PathBuf,
    site_url: Url,
    web_template: String,
    users: Mutex<BTreeMap<String, TargetUser>>,
}

#[derive(Serialize)]
struct PublishRecord {
    published: bool,
    post_as_news: bool,
}

impl FolderTargetContext {
    pub fn new(folder: impl Into<PathBuf>, site_url: Url, web_template: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            site_url,
            web_template: web_template.into(),
            users: Mutex::new(BTreeMap::new()),
        }
    }

    /// File holding the page at `page_url`, with `suffix` appended to its name.
    pub fn page_path(&self, page_url: &Url, suffix: &str) -> Result<PathBuf, BoxError> {
        if page_url.origin() != self.site_url.origin() {
            return Err(format!("{page_url} is not on site {}", self.site_url).into());
        }
        let relative = page_url
            .path()
            .strip_prefix(self.site_url.path())
            .ok_or_else(|| format!("{page_url} is not below site {}", self.site_url))?;

        let mut path = self.folder.clone();
        let mut segments = relative.split('/').filter(|s| !s.is_empty()).peekable();
        if segments.peek().is_none() {
            return Err(format!("{page_url} does not name a page").into());
        }
        for segment in segments {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return Err(format!("{page_url} escapes the target folder").into());
            }
            path.push(segment);
        }
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(suffix);
        path.set_file_name(name);
        Ok(path)
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), BoxError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(value)?).await?;
        Ok(())
    }
}

#[async_trait]
impl TargetContext for FolderTargetContext {
    fn site_url(&self) -> &Url {
        &self.site_url
    }

    async fn get_web_template(&self, _token: &CancellationToken) -> Result<String, BoxError> {
        Ok(self.web_template.clone())
    }

    async fn page_exists(&self, page_url: &Url, _token: &CancellationToken) -> Result<bool, BoxError> {
        Ok(tokio::fs::try_exists(self.page_path(page_url, ".json")?).await?)
    }

    async fn save_page(
        &self,
        page: &ClientSidePage,
        page_url: &Url,
        _token: &CancellationToken,
    ) -> Result<Url, BoxError> {
        let path = self.page_path(page_url, ".json")?;
        self.write_json(&path, page).await?;
        info!(page_url = %page_url, path = ?path, "[TARGET] Page written");
        Ok(page_url.clone())
    }

    async fn ensure_user(
        &self,
        principal: &str,
        _token: &CancellationToken,
    ) -> Result<Option<TargetUser>, BoxError> {
        if principal.trim().is_empty() {
            return Ok(None);
        }
        let mut users = self.users.lock().await;
        let next_id = users.len() as i64 + 1;
        // Claims logins look like `i:0#.f|membership|ada@contoso.example`.
        let account = principal.rsplit('|').next().unwrap_or(principal);
        let user = users
            .entry(principal.to_lowercase())
            .or_insert_with(|| TargetUser {
                id: next_id,
                login_name: principal.to_string(),
                display_name: None,
                email: account.contains('@').then(|| account.to_string()),
            });
        Ok(Some(user.clone()))
    }

    async fn set_page_fields(
        &self,
        page_url: &Url,
        fields: &BTreeMap<String, FieldValue>,
        _token: &CancellationToken,
    ) -> Result<(), BoxError> {
        self.write_json(&self.page_path(page_url, ".fields.json")?, fields)
            .await
    }

    async fn set_page_permissions(
        &self,
        page_url: &Url,
        assignments: &[RoleAssignment],
        _token: &CancellationToken,
    ) -> Result<(), BoxError> {
        if assignments.is_empty() {
            warn!(page_url = %page_url, "[TARGET] No role assignments to copy");
        }
        self.write_json(&self.page_path(page_url, ".permissions.json")?, assignments)
            .await
    }

    async fn publish_page(
        &self,
        page_url: &Url,
        post_as_news: bool,
        _token: &CancellationToken,
    ) -> Result<(), BoxError> {
        let record = PublishRecord {
            published: true,
            post_as_news,
        };
        self.write_json(&self.page_path(page_url, ".publish.json")?, &record)
            .await
    }
}
