use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Fetches remote bytes: documents for the scratch area, photos for re-upload.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

#[async_trait]
impl Downloader for reqwest::Client {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let res = self.get(url).send().await?;

        if !res.status().is_success() {
            return Err(DownloadError::Status { url: url.into(), status: res.status().as_u16() });
        }

        Ok(res.bytes().await?.to_vec())
    }
}
