//! Apple software-update catalog resolution.
//!
//! Resolution is two-stage by the nature of the format: the catalog itself
//! only says which products are OS installers, while the human-readable
//! version string lives in a per-product metadata document behind a second
//! URL. Candidate metadata fetches fan out with a bounded concurrency limit
//! and fan back in preserving scan order, so the result is the same as a
//! sequential scan.

mod catalog;
mod package;
mod product;

pub use catalog::Catalog;
pub use package::{ChecksumKind, PackageChecksum, PackageEntry};
pub use product::{OS_INSTALL_KEY, OS_INSTALL_MARKER, Product, ServerMetadata};

use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::{Fetcher, FetchError, OSINSTALL_USER_AGENT, REQUEST_TIMEOUT};
use crate::downloader::{self, DownloadError};

/// Upper bound on concurrent per-candidate metadata fetches. Independent,
/// read-only lookups, so parallelism is safe; the bound keeps us polite
/// towards the distribution service.
pub const METADATA_FETCH_CONCURRENCY: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("document did not decode as a software-update property list: {0}")]
    Malformed(#[from] plist::Error),
    #[error("product {0} is not present in this catalog")]
    UnknownProduct(String),
    #[error("package entries {first} and {second} would both download to '{name}'")]
    DuplicateFileName {
        name: String,
        first: String,
        second: String,
    },
    #[error("failed to create destination directory {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// What to do when one entry of a package batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPolicy {
    /// Stop the batch at the first failure (reference behavior).
    AbortOnError,
    /// Log the failure and keep going with the remaining entries.
    ContinueOnError,
}

/// Catalog resolver over an injectable fetcher.
pub struct CatalogService<F> {
    fetcher: F,
}

impl<F: Fetcher> CatalogService<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// GET the raw catalog document. No retry; transport failures and
    /// non-success statuses surface as-is.
    pub async fn fetch_catalog(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        log::info!("fetching catalog {url}");
        Ok(self.fetcher.fetch(url).await?)
    }

    /// Decode catalog bytes into the in-memory model.
    pub fn parse_catalog(bytes: &[u8]) -> Result<Catalog, CatalogError> {
        Ok(plist::from_bytes(bytes)?)
    }

    /// Fetch and parse in one step.
    pub async fn load_catalog(&self, url: &str) -> Result<Catalog, CatalogError> {
        let bytes = self.fetch_catalog(url).await?;
        Self::parse_catalog(&bytes)
    }

    /// Find every product whose metadata version string contains
    /// `version` as a substring, restricted to OS-install packages.
    ///
    /// Substring matching is deliberate: resolving "10.15" must also match
    /// "10.15.1" and later point releases. An empty result is a normal
    /// outcome, not an error.
    pub async fn find_install_candidates(
        &self,
        catalog: &Catalog,
        version: &str,
    ) -> Result<Vec<String>, CatalogError> {
        // Phase 1: cheap local filter on the install marker. Products
        // without a metadata document can never be matched, so they drop
        // out here as well.
        let candidates: Vec<(&str, &str)> = catalog
            .product_ids()
            .into_iter()
            .filter_map(|id| {
                let product = catalog.product(id)?;
                if !product.is_os_installer() {
                    return None;
                }
                product.server_metadata_url().map(|url| (id, url))
            })
            .collect();

        log::debug!(
            "{} OS-install candidates before version filtering",
            candidates.len()
        );

        // Phase 2: the expensive part, one metadata fetch per survivor.
        // `buffered` preserves input order, so the fan-in result reads the
        // same as a sequential scan of the catalog.
        let checked: Vec<(String, bool)> = stream::iter(candidates)
            .map(|(id, url)| async move {
                let matched = self.metadata_matches(url, version).await?;
                Ok::<_, CatalogError>((id.to_string(), matched))
            })
            .buffered(METADATA_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(checked
            .into_iter()
            .filter_map(|(id, matched)| matched.then_some(id))
            .collect())
    }

    async fn metadata_matches(&self, url: &str, version: &str) -> Result<bool, CatalogError> {
        let bytes = self.fetcher.fetch(url).await?;
        let metadata: ServerMetadata = plist::from_bytes(&bytes)?;
        Ok(metadata
            .short_version()
            .is_some_and(|v| v.contains(version)))
    }
}

/// Keyword filter over a product's package list. A `None` keyword keeps
/// everything; otherwise only entries whose URL contains the keyword stay.
pub fn select_packages<'a>(
    packages: &'a [PackageEntry],
    keyword: Option<&str>,
) -> Vec<&'a PackageEntry> {
    packages
        .iter()
        .filter(|entry| keyword.is_none_or(|k| entry.url().contains(k)))
        .collect()
}

/// Verify that every selected entry downloads to a distinct filename.
/// Concurrent or sequential, two entries sharing a target name would race on
/// the same file, so the batch is rejected before any byte is transferred.
fn check_distinct_file_names(selected: &[&PackageEntry]) -> Result<(), CatalogError> {
    let mut seen: std::collections::HashMap<String, &str> = std::collections::HashMap::new();
    for entry in selected {
        let name = entry.file_name();
        if let Some(first) = seen.insert(name.clone(), entry.url()) {
            return Err(CatalogError::DuplicateFileName {
                name,
                first: first.to_string(),
                second: entry.url().to_string(),
            });
        }
    }
    Ok(())
}

/// Download the package list of one product into `destination`.
///
/// The destination directory is created if absent (creating an existing
/// directory is not an error). Files land directly under it, named by the
/// final path segment of their source URL. Already-downloaded files are left
/// on disk when a later entry fails; callers wanting atomicity must roll
/// back themselves.
pub async fn fetch_packages_for_product(
    catalog: &Catalog,
    product_id: &str,
    destination: &Path,
    keyword: Option<&str>,
    policy: DownloadPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>, CatalogError> {
    let product = catalog
        .product(product_id)
        .ok_or_else(|| CatalogError::UnknownProduct(product_id.to_string()))?;

    downloader::ensure_directory(destination).map_err(|source| CatalogError::Destination {
        path: destination.to_path_buf(),
        source,
    })?;

    let selected = select_packages(product.packages(), keyword);
    check_distinct_file_names(&selected)?;

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let mut downloaded = Vec::with_capacity(selected.len());
    for entry in selected {
        let result = downloader::download_file(
            &client,
            OSINSTALL_USER_AGENT,
            entry.url(),
            entry.size(),
            entry.checksum(),
            destination,
            cancel,
        )
        .await;

        match result {
            Ok(path) => downloaded.push(path),
            Err(err) => match policy {
                DownloadPolicy::AbortOnError => return Err(err.into()),
                DownloadPolicy::ContinueOnError => {
                    log::error!("skipping {}: {err}", entry.url());
                }
            },
        }
    }

    Ok(downloaded)
}
