use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

/// Fetch-a-CSV-by-URL capability. The loader only sees this trait, so
/// tests drive it from canned bodies instead of the network.
#[async_trait]
pub trait CsvFetcher: Send + Sync {
    /// Body text served at `url`; any non-success status is an error.
    async fn fetch_csv(&self, url: &str) -> Result<String>;
}

/// Production fetcher over a shared reqwest client.
pub struct HttpCsvFetcher {
    client: Client,
}

impl HttpCsvFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CsvFetcher for HttpCsvFetcher {
    async fn fetch_csv(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("downloading {}", url))?;
        resp.text()
            .await
            .with_context(|| format!("reading body of {}", url))
    }
}
