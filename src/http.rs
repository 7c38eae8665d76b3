use crate::error::NetError;
use crate::utils::retry::{classify_status, retry_transient, transport_error, RetryPolicy};
use async_trait::async_trait;
use std::time::Duration;

/// Plain GET returning the response body as text.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, NetError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            client,
            timeout,
            retry,
        }
    }

    async fn get_once(&self, url: &str) -> Result<String, NetError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| transport_error(url, &e))?;
        if !status.is_success() {
            return Err(classify_status(url, status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get_text(&self, url: &str) -> Result<String, NetError> {
        retry_transient(self.retry, url, || self.get_once(url)).await
    }
}
