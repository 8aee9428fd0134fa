use reqwest::Client;
use shared::vatsim::datafeed::{DATAFEED_URL, DatafeedRoot};

use crate::error::FetchError;

/// Thin client for the VATSIM v3 data feed. Every call is a fresh network
/// round trip; callers skip their cycle on failure and wait for the next tick.
#[derive(Clone)]
pub struct DatafeedClient {
    client: Client,
}

impl DatafeedClient {
    pub const fn new_with_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn fetch(&self) -> Result<DatafeedRoot, FetchError> {
        let resp = self
            .client
            .get(DATAFEED_URL)
            .send()
            .await
            .map_err(FetchError::Unreachable)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status));
        }

        let body = resp.text().await.map_err(FetchError::Unreachable)?;
        Ok(serde_json::from_str(&body)?)
    }
}
