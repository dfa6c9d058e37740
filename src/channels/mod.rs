//! Externalized (version, channel) -> catalog-URL table.
//!
//! The catalog topology is configuration data, not logic: it ships as a JSON
//! file and is loaded once into a process-wide cache, so the resolver never
//! embeds vendor URLs and tests can point it at synthetic documents.

mod models;

use std::{fs, path::Path, sync::OnceLock};

pub use models::CatalogFeed;

/// Single, module-private cache (set exactly once).
static CACHE: OnceLock<Vec<CatalogFeed>> = OnceLock::new();

/// Initialize from a JSON file path.
pub fn init_from_file(path: impl AsRef<Path>) -> Result<(), ChannelsError> {
    let data = fs::read_to_string(path).map_err(ChannelsError::Io)?;
    init_from_json_str(&data)
}

/// Initialize from a JSON string.
pub fn init_from_json_str(json: &str) -> Result<(), ChannelsError> {
    let parsed: Vec<CatalogFeed> = serde_json::from_str(json).map_err(ChannelsError::Json)?;
    CACHE
        .set(parsed)
        .map_err(|_| ChannelsError::AlreadyInitialized)?;
    Ok(())
}

/// Initialize from an env var containing JSON.
#[allow(unused)]
pub fn init_from_env(var: &str) -> Result<(), ChannelsError> {
    let s = std::env::var(var).map_err(|_| ChannelsError::MissingEnv(var.to_string()))?;
    init_from_json_str(&s)
}

/// Borrow every configured feed.
pub fn all() -> Result<&'static [CatalogFeed], ChannelsError> {
    CACHE
        .get()
        .map(|v| v.as_slice())
        .ok_or(ChannelsError::NotInitialized)
}

/// Find the feed for a macOS version without cloning.
pub fn by_version(version: &str) -> Result<Option<&'static CatalogFeed>, ChannelsError> {
    let feeds = CACHE.get().ok_or(ChannelsError::NotInitialized)?;
    Ok(feeds.iter().find(|f| f.version() == version))
}

/// Resolve the catalog URL for a (version, channel) pair.
pub fn catalog_url(version: &str, channel: &str) -> Result<&'static str, ChannelsError> {
    let feed = by_version(version)?.ok_or_else(|| ChannelsError::UnknownVersion {
        version: version.to_string(),
    })?;
    feed.channel_url(channel)
        .ok_or_else(|| ChannelsError::UnknownChannel {
            version: version.to_string(),
            channel: channel.to_string(),
        })
}

#[derive(thiserror::Error, Debug)]
pub enum ChannelsError {
    #[error("catalog feeds are not initialized")]
    NotInitialized,
    #[error("catalog feeds already initialized")]
    AlreadyInitialized,
    #[error("missing env var: {0}")]
    MissingEnv(String),
    #[error("no catalog feed for macOS version {version}")]
    UnknownVersion { version: String },
    #[error("no {channel} channel for macOS version {version}")]
    UnknownChannel { version: String, channel: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "version": "10.15",
            "channels": {
                "PublicRelease": "https://example.test/10.15.sucatalog",
                "DeveloperSeed": "https://example.test/10.15seed.sucatalog"
            }
        }
    ]"#;

    fn init_once() {
        // Tests share one process-wide cache; the second init is expected
        // to fail with AlreadyInitialized and that is fine here.
        let _ = init_from_json_str(SAMPLE);
    }

    #[test]
    fn resolves_known_version_and_channel() {
        init_once();
        let url = catalog_url("10.15", "PublicRelease").unwrap();
        assert_eq!(url, "https://example.test/10.15.sucatalog");
    }

    #[test]
    fn unknown_version_is_an_error() {
        init_once();
        assert!(matches!(
            catalog_url("10.99", "PublicRelease"),
            Err(ChannelsError::UnknownVersion { .. })
        ));
    }

    #[test]
    fn unknown_channel_is_an_error() {
        init_once();
        assert!(matches!(
            catalog_url("10.15", "CustomerSeed"),
            Err(ChannelsError::UnknownChannel { .. })
        ));
    }

    #[test]
    fn channels_are_sorted_for_menus() {
        init_once();
        let feed = by_version("10.15").unwrap().unwrap();
        assert_eq!(feed.channels(), vec!["DeveloperSeed", "PublicRelease"]);
    }
}
