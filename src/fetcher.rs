use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::{Error, Result};

pub const FEED_ACCEPT: &str = "application/rss+xml, application/xml, text/xml; q=0.9, */*; q=0.8";

/// Retrieves the raw feed document. One attempt per call, no retries.
pub struct FeedFetcher {
    client: Client,
    url: String,
}

impl FeedFetcher {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<Vec<u8>> {
        info!("Fetching feed: {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "{} responded with {}",
                self.url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", self.url, e)))?;

        debug!("Received {} bytes from {}", bytes.len(), self.url);
        Ok(bytes.to_vec())
    }
}
