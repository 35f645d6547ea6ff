pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    CommentScraperInput, DatasetPage, InstagramComment, InstagramPost, InstagramScraperInput,
    RunData,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apify/instagram-post-scraper.
const INSTAGRAM_POST_SCRAPER: &str = "nH2AHrwxeTRJoN5hX";

/// Actor ID for apify/instagram-comment-scraper.
const INSTAGRAM_COMMENT_SCRAPER: &str = "SbK00X0JYCPblD2wp";

/// Seconds the API holds a run-status request open before answering.
const WAIT_FOR_FINISH_SECS: u64 = 60;

pub struct ApifyClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Result<Self> {
        Self::with_base_url(token, BASE_URL)
    }

    /// Point the client at a different API root (tests, proxies).
    pub fn with_base_url(token: String, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WAIT_FOR_FINISH_SECS + 30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }

    async fn start_run<I: Serialize>(&self, actor: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::check(resp).await?.json().await?;
        Ok(api_resp.data)
    }

    /// Start an Instagram profile scrape run. Returns immediately with run metadata.
    pub async fn start_instagram_scrape(&self, username: &str, limit: u32) -> Result<RunData> {
        let input = InstagramScraperInput {
            username: vec![username.to_string()],
            results_limit: limit,
        };
        self.start_run(INSTAGRAM_POST_SCRAPER, &input).await
    }

    /// Start a comment scrape for a single post URL.
    pub async fn start_comment_scrape(&self, post_url: &str, limit: u32) -> Result<RunData> {
        let input = CommentScraperInput {
            direct_urls: vec![post_url.to_string()],
            results_limit: limit,
        };
        self.start_run(INSTAGRAM_COMMENT_SCRAPER, &input).await
    }

    /// Poll until a run completes. Uses `waitForFinish` for efficient long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        loop {
            let url = format!(
                "{}/actor-runs/{}?waitForFinish={}",
                self.base_url, run_id, WAIT_FOR_FINISH_SECS
            );
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let api_resp: ApiResponse<RunData> = Self::check(resp).await?.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed(api_resp.data.status));
                }
                _ => {
                    tracing::debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                    continue;
                }
            }
        }
    }

    /// Abort a run that is still in progress.
    pub async fn abort_run(&self, run_id: &str) -> Result<RunData> {
        let url = format!("{}/actor-runs/{}/abort", self.base_url, run_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::check(resp).await?.json().await?;
        Ok(api_resp.data)
    }

    /// Fetch one page of dataset items starting at `offset`.
    pub async fn get_dataset_page<T: DeserializeOwned>(
        &self,
        dataset_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<DatasetPage<T>> {
        let url = format!(
            "{}/datasets/{}/items?format=json&clean=true&offset={}&limit={}",
            self.base_url, dataset_id, offset, limit
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let resp = Self::check(resp).await?;
        let total = resp
            .headers()
            .get("x-apify-pagination-total")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let items: Vec<T> = resp.json().await?;
        Ok(DatasetPage {
            items,
            offset,
            total,
        })
    }
}
