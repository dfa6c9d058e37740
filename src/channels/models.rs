use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One catalog feed: a macOS version plus the per-channel document URLs.
/// Public model; serde is confined to this module tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFeed {
    pub(crate) version: String,
    #[serde(rename = "channels")]
    pub(crate) channel_urls: HashMap<String, String>,
}

impl CatalogFeed {
    pub fn version(&self) -> &str {
        &self.version
    }

    /// URL of the catalog document for the given release channel.
    pub fn channel_url(&self, channel: &str) -> Option<&str> {
        self.channel_urls.get(channel).map(String::as_str)
    }

    /// Channel names this feed knows about, sorted for stable menus.
    pub fn channels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channel_urls.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}
