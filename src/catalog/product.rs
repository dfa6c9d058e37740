use serde::Deserialize;
use std::collections::HashMap;

/// Marker key and value identifying an OS-install package inside
/// `ExtendedMetaInfo.InstallAssistantPackageIdentifiers`.
pub const OS_INSTALL_KEY: &str = "OSInstall";
pub const OS_INSTALL_MARKER: &str = "com.apple.mpkg.OSInstall";

/// One installable unit from the catalog. Read-only after parse.
#[derive(Debug, Deserialize)]
pub struct Product {
    #[serde(rename = "ExtendedMetaInfo", default)]
    extended_meta_info: Option<ExtendedMetaInfo>,

    /// Secondary document carrying the human-readable version string.
    /// Resolving a version therefore costs a second fetch per candidate.
    #[serde(rename = "ServerMetadataURL", default)]
    server_metadata_url: Option<String>,

    #[serde(rename = "Packages", default)]
    packages: Vec<super::PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct ExtendedMetaInfo {
    #[serde(rename = "InstallAssistantPackageIdentifiers", default)]
    install_assistant_package_identifiers: Option<HashMap<String, String>>,
}

impl Product {
    /// Presence test on the nested marker path. A missing level anywhere in
    /// the path means "not an installer", never an error.
    pub fn is_os_installer(&self) -> bool {
        self.extended_meta_info
            .as_ref()
            .and_then(|meta| meta.install_assistant_package_identifiers.as_ref())
            .and_then(|ids| ids.get(OS_INSTALL_KEY))
            .is_some_and(|v| v == OS_INSTALL_MARKER)
    }

    pub fn server_metadata_url(&self) -> Option<&str> {
        self.server_metadata_url.as_deref()
    }

    pub fn packages(&self) -> &[super::PackageEntry] {
        &self.packages
    }
}

/// Per-product metadata document fetched from `ServerMetadataURL`.
#[derive(Debug, Deserialize)]
pub struct ServerMetadata {
    #[serde(rename = "CFBundleShortVersionString", default)]
    short_version: Option<String>,
}

impl ServerMetadata {
    pub fn short_version(&self) -> Option<&str> {
        self.short_version.as_deref()
    }
}
