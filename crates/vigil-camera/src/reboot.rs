//! HTTP client for camera reboot endpoints

use crate::error::CameraError;
use std::time::Duration;
use tracing::debug;

/// Some camera firmwares reject requests without a browser user agent
const USER_AGENT: &str = "Mozilla/5.0";

/// Issues reboot requests; one client is shared by every controller
#[derive(Debug, Clone)]
pub struct RebootClient {
    client: reqwest::Client,
}

impl RebootClient {
    pub fn new() -> Result<Self, CameraError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and return the response status
    ///
    /// The URL usually carries credentials, so it is never logged.
    pub async fn reboot(&self, url: &str, timeout: Duration) -> Result<u16, CameraError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(status, "Reboot endpoint answered");
        Ok(status)
    }
}
