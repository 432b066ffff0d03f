use std::time::Duration;

use async_trait::async_trait;
use log::trace;
use serde_json::Value;

use crate::error::DownloadError;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("comix-dl/", env!("CARGO_PKG_VERSION"));

/// One HTTP round trip. Implementations never retry; callers layer
/// [`crate::retry::with_retry`] on top where needed.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, DownloadError>;

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        trace!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::transport(url, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::transport(url, Some(status.as_u16()), status.to_string()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_json(&self, url: &str) -> Result<Value, DownloadError> {
        let response = self.get(url).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| DownloadError::transport(url, None, format!("invalid JSON body: {}", e)))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::transport(url, None, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
