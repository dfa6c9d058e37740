use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

/// User-Agent presented when talking to the software distribution service
/// (catalog and per-product metadata documents).
pub const SWUPDATE_USER_AGENT: &str =
    "Software%20Update (unknown version) CFNetwork/807.0.1 Darwin/16.0.0 (x86_64)";

/// User-Agent presented when downloading installer payloads from the CDN.
pub const OSINSTALL_USER_AGENT: &str =
    "osinstallersetupplaind (unknown version) CFNetwork/720.5.7 Darwin/14.5.0 (x86_64)";

/// Per-request timeout. There is deliberately no retry on top of this.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
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
    #[error("fetch of {url} was cancelled")]
    Cancelled { url: String },
}

/// Seam between the resolver logic and the network.
///
/// The resolver only ever needs "give me the bytes behind this URL", so the
/// trait stays that small; tests substitute an in-memory map for it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `reqwest`-backed fetcher with a fixed identifying header set.
pub struct HttpFetcher {
    client: Client,
    user_agent: &'static str,
    cancel: CancellationToken,
}

impl HttpFetcher {
    pub fn new(user_agent: &'static str, cancel: CancellationToken) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            user_agent,
            cancel,
        })
    }

    /// Fetcher speaking to the software distribution service.
    pub fn swupdate(cancel: CancellationToken) -> Result<Self, reqwest::Error> {
        Self::new(SWUPDATE_USER_AGENT, cancel)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        log::debug!("GET {url}");

        let request = self.client.get(url).header("User-Agent", self.user_agent);

        let response = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            res = request.send() => res.map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            body = response.bytes() => body.map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?,
        };

        Ok(bytes.to_vec())
    }
}
