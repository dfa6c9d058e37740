//! Bootloader release resolution against the GitHub releases API.
//!
//! Unlike catalog search, where an empty result is normal, a release tag is
//! expected to resolve to exactly one entry; no match is a hard error.

use serde::Deserialize;

use crate::client::{FetchError, Fetcher};

/// Tag value meaning "whatever the hosting API lists first".
pub const LATEST: &str = "latest";

#[derive(thiserror::Error, Debug)]
pub enum ReleaseError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("release list did not decode as JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("release '{tag}' was not found")]
    NotFound { tag: String },
    #[error("release '{tag}' has no downloadable asset{}", keyword.as_deref().map(|k| format!(" matching '{k}'")).unwrap_or_default())]
    NoAsset { tag: String, keyword: Option<String> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    #[serde(default)]
    pub name: Option<String>,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// First asset whose download URL contains `keyword`, or the first asset
    /// at all when no keyword is given.
    pub fn asset_url(&self, keyword: Option<&str>) -> Result<&str, ReleaseError> {
        self.assets
            .iter()
            .find(|a| keyword.is_none_or(|k| a.browser_download_url.contains(k)))
            .map(|a| a.browser_download_url.as_str())
            .ok_or_else(|| ReleaseError::NoAsset {
                tag: self.tag_name.clone(),
                keyword: keyword.map(str::to_string),
            })
    }
}

/// Fetch the release list for `owner/repo`.
pub async fn fetch_releases<F: Fetcher>(
    fetcher: &F,
    repo: &str,
) -> Result<Vec<Release>, ReleaseError> {
    let url = format!("https://api.github.com/repos/{repo}/releases");
    log::info!("fetching release list {url}");
    let bytes = fetcher.fetch(&url).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Resolve a symbolic tag against a release list.
///
/// `latest` picks the newest entry (the API returns newest first); anything
/// else must match a `tag_name` or display name exactly.
pub fn resolve<'a>(releases: &'a [Release], tag: &str) -> Result<&'a Release, ReleaseError> {
    if tag == LATEST {
        return releases.first().ok_or_else(|| ReleaseError::NotFound {
            tag: tag.to_string(),
        });
    }
    releases
        .iter()
        .find(|r| r.tag_name == tag || r.name.as_deref() == Some(tag))
        .ok_or_else(|| ReleaseError::NotFound {
            tag: tag.to_string(),
        })
}
