use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, ORIGIN, REFERER};
use std::time::Duration;
use tracing::debug;

use crate::core::config::ApiConfig;
use crate::core::error::FetchError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// The two authenticated calls the poller makes.
///
/// Implementations only validate the HTTP envelope: a 200 with any body is `Ok`.
#[async_trait]
pub trait UsageApi: Send + Sync {
    /// GET the bootstrap document, sending the credential as the session cookie.
    async fn fetch_bootstrap(&self, credential: &str) -> Result<String, FetchError>;

    /// GET the usage document for `org_id`, sending the full credential as the cookie header.
    async fn fetch_usage(&self, org_id: &str, credential: &str) -> Result<String, FetchError>;
}

pub struct HttpUsageApi {
    client: reqwest::Client,
    api: ApiConfig,
}

impl HttpUsageApi {
    pub fn new(api: ApiConfig, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client, api })
    }

    /// Browser-style GET. The User-Agent comes from the client defaults.
    fn request(&self, url: &str, cookie: String) -> reqwest::RequestBuilder {
        let origin = self.api.base_url.trim_end_matches('/');
        self.client
            .get(url)
            .header(COOKIE, cookie)
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/json")
            .header(ORIGIN, origin)
            .header(REFERER, origin)
    }

    async fn get(&self, url: &str, cookie: String) -> Result<String, FetchError> {
        debug!("Fetching from: {}", url);
        let response = self.request(url, cookie).send().await?;

        let status = response.status();
        debug!("Status: {}", status.as_u16());
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl UsageApi for HttpUsageApi {
    async fn fetch_bootstrap(&self, credential: &str) -> Result<String, FetchError> {
        let cookie = format!("{}={}", self.api.session_cookie_name, credential);
        self.get(&self.api.bootstrap_url(), cookie).await
    }

    async fn fetch_usage(&self, org_id: &str, credential: &str) -> Result<String, FetchError> {
        self.get(&self.api.usage_url(org_id), credential.to_string())
            .await
    }
}
