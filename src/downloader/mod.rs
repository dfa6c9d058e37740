//! Streamed payload downloads.
//!
//! Bodies are written to disk in chunks as they arrive (no whole-body
//! buffering) with progress reported against the catalog's declared size.
//! After the stream closes the byte count is checked against that size, and
//! the declared digest is verified when the catalog carries one.

use std::cmp::min;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::catalog::{ChecksumKind, PackageChecksum};

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("GET {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{url}: downloaded {actual} bytes but the catalog declared {expected}")]
    SizeMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },
    #[error("{url}: {kind} digest mismatch (expected {expected}, got {actual})")]
    DigestMismatch {
        url: String,
        kind: ChecksumKind,
        expected: String,
        actual: String,
    },
    #[error("download of {url} was cancelled")]
    Cancelled { url: String },
}

/// Create `path` and any missing parents. Creating an already-existing
/// directory is success; calling this twice is a no-op.
pub fn ensure_directory(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Target filename for a URL: the final non-empty path segment, with query
/// strings and fragments stripped. The duplicate-name pre-check and the
/// actual write both go through here, so they cannot disagree.
pub fn file_name_for_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

fn progress_bar(total: u64, url: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] \
         {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Fetching {url}"));
    pb
}

/// Stream `url` into `dest_dir`, named by the URL's final path segment.
///
/// `expected_size` comes from the catalog and drives both the progress bar
/// and the post-download length check (skipped when the catalog declared no
/// size). Returns the path of the completed file. A partial file is left in
/// place on failure; callers must not treat its presence as validity.
pub async fn download_file(
    client: &reqwest::Client,
    user_agent: &str,
    url: &str,
    expected_size: u64,
    checksum: Option<PackageChecksum>,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf, DownloadError> {
    let out_path = dest_dir.join(file_name_for_url(url));

    let mut response = client
        .get(url)
        .header("User-Agent", user_agent)
        .send()
        .await
        .map_err(|source| DownloadError::Network {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status,
        });
    }

    let total = if expected_size > 0 {
        expected_size
    } else {
        response.content_length().unwrap_or(0)
    };
    let pb = progress_bar(total, url);

    let mut file = File::create(&out_path).map_err(|source| DownloadError::Create {
        path: out_path.clone(),
        source,
    })?;

    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut downloaded: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                pb.abandon_with_message(format!("Cancelled {url}"));
                return Err(DownloadError::Cancelled { url: url.to_string() });
            }
            chunk = response.chunk() => chunk.map_err(|source| DownloadError::Network {
                url: url.to_string(),
                source,
            })?,
        };
        let Some(chunk) = chunk else { break };

        file.write_all(&chunk).map_err(|source| DownloadError::Write {
            path: out_path.clone(),
            source,
        })?;

        match checksum.as_ref().map(PackageChecksum::kind) {
            Some(ChecksumKind::Sha1) => sha1.update(&chunk),
            Some(ChecksumKind::Sha256) => sha256.update(&chunk),
            None => {}
        }

        downloaded += chunk.len() as u64;
        pb.set_position(min(downloaded, total));
    }

    file.flush().map_err(|source| DownloadError::Write {
        path: out_path.clone(),
        source,
    })?;
    pb.finish_with_message(format!("Downloaded {url} to {}", out_path.display()));

    if expected_size > 0 && downloaded != expected_size {
        return Err(DownloadError::SizeMismatch {
            url: url.to_string(),
            expected: expected_size,
            actual: downloaded,
        });
    }

    if let Some(expected) = checksum {
        let actual = match expected.kind() {
            ChecksumKind::Sha1 => hex::encode(sha1.finalize()),
            ChecksumKind::Sha256 => hex::encode(sha256.finalize()),
        };
        if !actual.eq_ignore_ascii_case(expected.value()) {
            return Err(DownloadError::DigestMismatch {
                url: url.to_string(),
                kind: expected.kind(),
                expected: expected.value().to_string(),
                actual,
            });
        }
        log::debug!("{url}: {} digest verified", expected.kind());
    }

    Ok(out_path)
}
