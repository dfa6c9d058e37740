use serde::Deserialize;
use std::fmt;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Sha1,
    Sha256,
}

impl ChecksumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience wrapper that couples the checksum value with its algorithm.
#[derive(Debug, Clone)]
pub struct PackageChecksum {
    kind: ChecksumKind,
    value: String,
}

impl PackageChecksum {
    pub fn new(kind: ChecksumKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ChecksumKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// One downloadable payload of a product: URL plus declared byte size.
///
/// The size drives progress reporting and the post-download length check.
/// Catalogs carry an optional `Digest` field (historically SHA-1 hex); when
/// present it is verified after the stream completes.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageEntry {
    #[serde(rename = "URL")]
    url: String,

    #[serde(rename = "Size", default)]
    size: u64,

    #[serde(rename = "Digest", default)]
    digest: Option<String>,
}

impl PackageEntry {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Declared digest, wrapped with its algorithm. The catalog format only
    /// carries SHA-1 today; the enum leaves room for stronger digests if the
    /// format grows them.
    pub fn checksum(&self) -> Option<PackageChecksum> {
        self.digest
            .as_ref()
            .map(|value| PackageChecksum::new(ChecksumKind::Sha1, value.clone()))
    }

    /// Target filename this entry downloads to.
    pub fn file_name(&self) -> String {
        crate::downloader::file_name_for_url(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_final_path_segment() {
        let entry: PackageEntry = plist::from_bytes(
            br#"<?xml version="1.0" encoding="UTF-8"?>
            <plist version="1.0"><dict>
                <key>URL</key><string>https://example.test/content/OSInstall.pkg</string>
                <key>Size</key><integer>100</integer>
            </dict></plist>"#,
        )
        .unwrap();
        assert_eq!(entry.file_name(), "OSInstall.pkg");
        assert_eq!(entry.size(), 100);
        assert!(entry.checksum().is_none());
    }

    #[test]
    fn file_name_ignores_query_strings() {
        let entry: PackageEntry = plist::from_bytes(
            br#"<?xml version="1.0" encoding="UTF-8"?>
            <plist version="1.0"><dict>
                <key>URL</key><string>https://example.test/content/OSInstall.pkg?auth=abc</string>
            </dict></plist>"#,
        )
        .unwrap();
        assert_eq!(entry.file_name(), "OSInstall.pkg");
    }
}
