/// `load_config` module: reads the static YAML run configuration and applies
/// environment overrides.
///
/// # Accepted YAML
/// ```yaml
/// source_folder: ./classic-pages
/// target_folder: ./modern-pages
/// target_site_url: https://contoso.example/sites/intranet/
/// target_site_template: STS#3
/// state_folder: ./state
/// options:
///   overwrite: true
///   target_page_prefix: Migrated_
///   source_site_url: https://legacy.contoso.example/sites/intranet/
/// ```
///
/// `TARGET_SITE_URL`, when set, replaces `target_site_url`. Every key of
/// `options` is optional and falls back to the pipeline defaults.
///
/// # Errors
/// Failures are `anyhow::Error`s naming the file and the cause; they surface
/// at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use page_transform::options::PageTransformationOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use url::Url;

/// Environment variable overriding the target site URL.
pub const TARGET_SITE_URL_ENV: &str = "TARGET_SITE_URL";

/// Web template reported for the target folder when none is configured.
pub const DEFAULT_SITE_TEMPLATE: &str = "STS#3";

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub source_folder: PathBuf,
    pub target_folder: PathBuf,
    pub target_site_url: Url,
    pub target_site_template: String,
    pub state_folder: PathBuf,
    pub options: PageTransformationOptions,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    source_folder: PathBuf,
    target_folder: PathBuf,
    #[serde(default)]
    target_site_url: Option<String>,
    #[serde(default)]
    target_site_template: Option<String>,
    state_folder: PathBuf,
    #[serde(default)]
    options: PageTransformationOptions,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let site_url = match std::env::var(TARGET_SITE_URL_ENV) {
        Ok(value) if !value.trim().is_empty() => {
            info!("Target site URL taken from {TARGET_SITE_URL_ENV}");
            value
        }
        _ => raw.target_site_url.ok_or_else(|| {
            anyhow!("target_site_url is not configured and {TARGET_SITE_URL_ENV} is not set")
        })?,
    };
    let mut target_site_url = Url::parse(site_url.trim())
        .with_context(|| format!("Invalid target site URL '{site_url}'"))?;
    if !target_site_url.path().ends_with('/') {
        let path = format!("{}/", target_site_url.path());
        target_site_url.set_path(&path);
    }

    raw.options.trace_loaded();
    Ok(CliConfig {
        source_folder: raw.source_folder,
        target_folder: raw.target_folder,
        target_site_url,
        target_site_template: raw
            .target_site_template
            .unwrap_or_else(|| DEFAULT_SITE_TEMPLATE.to_string()),
        state_folder: raw.state_folder,
        options: raw.options,
    })
}
