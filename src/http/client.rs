use crate::errors::ScrapeResult;
use crate::rate_limiter::RateLimiter;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client with built-in rate limiting
pub struct RateLimitedClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl RateLimitedClient {
    pub fn new(user_agent: &str, timeout_secs: u64, rate_limit_ms: u64) -> ScrapeResult<Self> {
        let client = Self::build_client(user_agent, timeout_secs)?;
        let rate_limiter = RateLimiter::new(rate_limit_ms);

        Ok(Self {
            client,
            rate_limiter,
        })
    }

    pub async fn get(&mut self, url: &str) -> ScrapeResult<reqwest::Response> {
        self.rate_limiter.wait().await;
        self.send_get_request(url).await
    }

    /// GET `url` and decode a successful body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&mut self, url: &str) -> ScrapeResult<T> {
        let response = self.get(url).await?.error_for_status()?;
        let text = response.text().await?;
        Ok(serde_json::from_str(text.trim_start_matches('\u{feff}'))?)
    }

    fn build_client(user_agent: &str, timeout_secs: u64) -> ScrapeResult<Client> {
        Ok(Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?)
    }

    async fn send_get_request(&self, url: &str) -> ScrapeResult<reqwest::Response> {
        debug!("GET {}", url);
        Ok(self.client.get(url).send().await?)
    }
}
