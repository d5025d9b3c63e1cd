//! Firecrawl scrape client: turns a URL into clean markdown for the
//! research pipelines. Called only through
//! `ServiceGateway::execute("firecrawl", ...)`.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::gateway::ServiceError;

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    #[serde(rename = "onlyMainContent")]
    only_main_content: bool,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScrapedPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedPage {
    pub markdown: String,
    #[serde(default)]
    pub metadata: Option<PageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
}

#[derive(Clone)]
pub struct ScraperClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ScraperClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Scrapes the main content of `url` as markdown.
    pub async fn scrape(&self, url: &str) -> Result<ScrapedPage, ServiceError> {
        let request = ScrapeRequest {
            url,
            formats: ["markdown"],
            only_main_content: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ServiceError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Invalid(format!("malformed scrape response: {e}")))?;

        match parsed.data {
            Some(page) if parsed.success && !page.markdown.is_empty() => Ok(page),
            _ => Err(ServiceError::Invalid(
                "scrape returned no content".to_string(),
            )),
        }
    }
}
