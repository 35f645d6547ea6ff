//! Feed transport over the Apify Instagram actors.
//!
//! The profile run's dataset is the feed: one dataset page per batch. A post's
//! comments come from a comment-scraper run and are revealed one dataset page
//! at a time, so the collector sees the list grow until the dataset runs dry.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use apify_client::{ApifyClient, ApifyError, InstagramComment, InstagramPost, RunData};
use reelpulse_common::{FeedItem, ItemRef, MediaKind, Result, ScrapeError, ScrapeTuning};

use super::{from_apify, known_count};
use crate::traits::{FeedTransport, ItemDetail};

/// Comment run size for a tuning built without a per-post cap.
const DEFAULT_COMMENT_LIMIT: u32 = 1_000;

struct OpenComments {
    item_ref: ItemRef,
    dataset_id: String,
    next_offset: u64,
    revealed: Vec<String>,
    exhausted: bool,
}

pub struct ApiTransport {
    client: ApifyClient,
    post_limit: u32,
    page_size: u32,
    comment_page_size: u32,
    comment_limit: u32,
    dataset_id: Option<String>,
    offset: u64,
    last_page_len: u64,
    prefetched: Option<Vec<InstagramPost>>,
    detail: Option<OpenComments>,
    in_flight: Vec<String>,
}

impl ApiTransport {
    pub fn new(client: ApifyClient, tuning: &ScrapeTuning) -> Self {
        Self {
            client,
            post_limit: tuning.post_limit,
            page_size: tuning.page_size.max(1),
            comment_page_size: tuning.comment_page_size.max(1),
            comment_limit: tuning
                .max_comments_per_post
                .unwrap_or(DEFAULT_COMMENT_LIMIT),
            dataset_id: None,
            offset: 0,
            last_page_len: 0,
            prefetched: None,
            detail: None,
            in_flight: Vec::new(),
        }
    }

    /// Run ids started but not yet finished. Aborted on close.
    pub fn in_flight(&self) -> &[String] {
        &self.in_flight
    }

    /// Poll a started run to completion, keeping it registered meanwhile.
    /// A dropped or failed poll leaves the id behind for `close` to abort;
    /// a run that reached a terminal status is forgotten either way.
    async fn tracked_run(&mut self, run: RunData) -> apify_client::Result<RunData> {
        self.in_flight.push(run.id.clone());
        let result = self.client.wait_for_run(&run.id).await;
        if matches!(result, Ok(_) | Err(ApifyError::RunFailed(_))) {
            self.in_flight.retain(|id| id != &run.id);
        }
        result
    }

    async fn fetch_posts(&self, dataset_id: &str, offset: u64) -> Result<Vec<InstagramPost>> {
        let page = self
            .client
            .get_dataset_page::<InstagramPost>(dataset_id, offset, self.page_size)
            .await
            .map_err(from_apify)?;
        Ok(page.items)
    }

    async fn fetch_comments(&self, comments: &OpenComments) -> Result<Vec<InstagramComment>> {
        let page = self
            .client
            .get_dataset_page::<InstagramComment>(
                &comments.dataset_id,
                comments.next_offset,
                self.comment_page_size,
            )
            .await
            .map_err(from_apify)?;
        Ok(page.items)
    }

    /// Pull the next comment page into the open detail view.
    async fn reveal_page(&mut self) -> Result<()> {
        let Some(open) = self.detail.as_ref() else {
            return Err(ScrapeError::Transient("no detail view open".into()));
        };
        if open.exhausted {
            return Ok(());
        }
        let page = self.fetch_comments(open).await?;

        let Some(open) = self.detail.as_mut() else {
            return Ok(());
        };
        if page.is_empty() {
            open.exhausted = true;
            return Ok(());
        }
        open.next_offset += page.len() as u64;
        open.revealed
            .extend(page.into_iter().map(|c| c.text).filter(|t| !t.trim().is_empty()));
        Ok(())
    }
}

fn to_feed_item(post: InstagramPost) -> FeedItem {
    let kind = if post.is_reel() {
        MediaKind::Reel
    } else {
        match post.post_type.as_deref() {
            Some("Image") => MediaKind::Image,
            Some("Sidecar") => MediaKind::Carousel,
            _ => MediaKind::Unknown,
        }
    };

    FeedItem {
        timestamp: post.published_at(),
        view_count: known_count(post.views()),
        like_count: known_count(post.likes_count),
        caption: post.caption.clone().filter(|c| !c.trim().is_empty()),
        kind,
        ..FeedItem::new(ItemRef::new(post.url))
    }
}

#[async_trait]
impl FeedTransport for ApiTransport {
    async fn open(&mut self, account: &str) -> Result<()> {
        info!(account, limit = self.post_limit, "Starting profile run");
        let started = self
            .client
            .start_instagram_scrape(account, self.post_limit)
            .await
            .map_err(from_apify)?;
        let run = self.tracked_run(started).await.map_err(from_apify)?;

        let first = self.fetch_posts(&run.default_dataset_id, 0).await?;
        if let Some(err) = first.iter().find(|p| p.is_error()) {
            let reason = err
                .error_description
                .clone()
                .or_else(|| err.error.clone())
                .unwrap_or_default();
            return Err(ScrapeError::AccountNotFound(format!("{account}: {reason}")));
        }

        info!(
            account,
            dataset_id = %run.default_dataset_id,
            first_page = first.len(),
            "Profile run finished"
        );
        self.dataset_id = Some(run.default_dataset_id);
        self.offset = 0;
        self.prefetched = Some(first);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<FeedItem>>> {
        let posts = match self.prefetched.take() {
            Some(posts) => posts,
            None => {
                let Some(dataset_id) = self.dataset_id.clone() else {
                    return Err(ScrapeError::Fatal("session not open".into()));
                };
                self.fetch_posts(&dataset_id, self.offset).await?
            }
        };

        self.last_page_len = posts.len() as u64;
        if posts.is_empty() {
            return Ok(None);
        }
        let items = posts
            .into_iter()
            .filter(|p| !p.is_error() && !p.url.is_empty())
            .map(to_feed_item)
            .collect();
        Ok(Some(items))
    }

    async fn advance(&mut self) -> Result<()> {
        self.offset += self.last_page_len;
        self.last_page_len = 0;
        Ok(())
    }

    async fn open_detail(&mut self, item: &FeedItem) -> Result<ItemDetail> {
        let url = item.item_ref.as_str();
        let started = self
            .client
            .start_comment_scrape(url, self.comment_limit)
            .await
            .map_err(from_apify)?;
        // One post's comment run failing says nothing about the rest of the feed.
        let run = self.tracked_run(started).await.map_err(|e| match e {
            ApifyError::RunFailed(status) => {
                ScrapeError::Transient(format!("comment run for {url} ended {status}"))
            }
            other => from_apify(other),
        })?;
        debug!(item = %item.item_ref, run_id = %run.id, "Comment run finished");

        self.detail = Some(OpenComments {
            item_ref: item.item_ref.clone(),
            dataset_id: run.default_dataset_id,
            next_offset: 0,
            revealed: Vec::new(),
            exhausted: false,
        });
        self.reveal_page().await?;

        Ok(ItemDetail {
            caption: item.caption.clone(),
            view_count: item.view_count,
            like_count: item.like_count,
        })
    }

    async fn revealed_comments(&mut self, item: &FeedItem) -> Result<Vec<String>> {
        match self.detail.as_ref() {
            Some(open) if open.item_ref == item.item_ref => Ok(open.revealed.clone()),
            _ => Err(ScrapeError::Transient(format!(
                "no comments open for {}",
                item.item_ref
            ))),
        }
    }

    async fn reveal_more(&mut self, _item: &FeedItem) -> Result<()> {
        self.reveal_page().await
    }

    async fn release_detail(&mut self, _item: &FeedItem) -> Result<()> {
        self.detail = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        for run_id in std::mem::take(&mut self.in_flight) {
            match self.client.abort_run(&run_id).await {
                Ok(run) => info!(run_id, status = %run.status, "Aborted in-flight run"),
                Err(e) => warn!(run_id, error = %e, "Failed to abort in-flight run"),
            }
        }
        self.detail = None;
        self.prefetched = None;
        self.dataset_id = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "apify"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn run(id: &str, dataset: &str, status: &str) -> serde_json::Value {
        json!({ "data": { "id": id, "status": status, "defaultDatasetId": dataset } })
    }

    async fn mount_run(server: &MockServer, actor: &str, id: &str, dataset: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/acts/{actor}/runs")))
            .respond_with(ResponseTemplate::new(201).set_body_json(run(id, dataset, "RUNNING")))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/actor-runs/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(run(id, dataset, "SUCCEEDED")))
            .mount(server)
            .await;
    }

    /// A comment run for one post URL, finishing with `status`.
    async fn mount_comment_run(server: &MockServer, post_url: &str, id: &str, dataset: &str, status: &str) {
        Mock::given(method("POST"))
            .and(path("/acts/SbK00X0JYCPblD2wp/runs"))
            .and(body_partial_json(json!({ "directUrls": [post_url] })))
            .respond_with(ResponseTemplate::new(201).set_body_json(run(id, dataset, "RUNNING")))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/actor-runs/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(run(id, dataset, status)))
            .mount(server)
            .await;
    }

    async fn mount_page(server: &MockServer, dataset: &str, offset: u64, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/datasets/{dataset}/items")))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn transport(server: &MockServer) -> ApiTransport {
        let client = ApifyClient::with_base_url("test-token".into(), &server.uri()).unwrap();
        let tuning = ScrapeTuning {
            page_size: 2,
            comment_page_size: 2,
            ..ScrapeTuning::default()
        };
        ApiTransport::new(client, &tuning)
    }

    fn post(code: &str, ts: &str, likes: i64) -> serde_json::Value {
        json!({
            "url": format!("https://www.instagram.com/reel/{code}/"),
            "caption": format!("caption {code}"),
            "likesCount": likes,
            "videoViewCount": 100,
            "timestamp": ts,
            "productType": "clips"
        })
    }

    #[tokio::test]
    async fn pages_the_profile_dataset() {
        let server = MockServer::start().await;
        mount_run(&server, "nH2AHrwxeTRJoN5hX", "run-1", "ds-posts").await;
        mount_page(
            &server,
            "ds-posts",
            0,
            json!([post("A", "2024-05-09T10:00:00.000Z", 5), post("B", "2024-05-08T10:00:00.000Z", -1)]),
        )
        .await;
        mount_page(&server, "ds-posts", 2, json!([post("C", "2024-05-07T10:00:00.000Z", 1)])).await;
        mount_page(&server, "ds-posts", 3, json!([])).await;

        let mut t = transport(&server);
        t.open("someaccount").await.unwrap();

        let first = t.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].kind, MediaKind::Reel);
        assert_eq!(first[0].like_count, Some(5));
        assert_eq!(first[1].like_count, None);
        assert_eq!(first[1].view_count, Some(100));

        t.advance().await.unwrap();
        let second = t.next_batch().await.unwrap().unwrap();
        assert_eq!(second[0].item_ref.as_str(), "https://www.instagram.com/reel/C/");

        t.advance().await.unwrap();
        assert!(t.next_batch().await.unwrap().is_none());
        assert!(t.in_flight().is_empty());
    }

    #[tokio::test]
    async fn error_item_means_account_not_found() {
        let server = MockServer::start().await;
        mount_run(&server, "nH2AHrwxeTRJoN5hX", "run-1", "ds-posts").await;
        mount_page(
            &server,
            "ds-posts",
            0,
            json!([{ "url": "", "error": "not_found", "errorDescription": "Profile does not exist" }]),
        )
        .await;

        let err = transport(&server).open("ghost").await.unwrap_err();
        assert!(matches!(err, ScrapeError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn rejected_token_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/acts/nH2AHrwxeTRJoN5hX/runs"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let err = transport(&server).open("someaccount").await.unwrap_err();
        assert!(matches!(err, ScrapeError::AuthenticationFailure(_)));
    }

    #[tokio::test]
    async fn comments_grow_one_page_per_reveal() {
        let server = MockServer::start().await;
        mount_run(&server, "SbK00X0JYCPblD2wp", "run-c", "ds-comments").await;
        mount_page(&server, "ds-comments", 0, json!([{ "text": "first" }, { "text": "second" }])).await;
        mount_page(&server, "ds-comments", 2, json!([{ "text": "third" }])).await;
        mount_page(&server, "ds-comments", 3, json!([])).await;

        let mut t = transport(&server);
        let item = crate::testing::item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        t.open_detail(&item).await.unwrap();
        assert_eq!(t.revealed_comments(&item).await.unwrap(), vec!["first", "second"]);

        t.reveal_more(&item).await.unwrap();
        assert_eq!(t.revealed_comments(&item).await.unwrap().len(), 3);

        t.reveal_more(&item).await.unwrap();
        t.reveal_more(&item).await.unwrap();
        assert_eq!(t.revealed_comments(&item).await.unwrap().len(), 3);

        t.release_detail(&item).await.unwrap();
        assert!(t.revealed_comments(&item).await.is_err());
    }

    #[tokio::test]
    async fn failed_comment_run_is_transient() {
        let server = MockServer::start().await;
        let url = "https://www.instagram.com/reel/A/";
        mount_comment_run(&server, url, "run-a", "ds-a", "FAILED").await;

        let mut t = transport(&server);
        let item = crate::testing::item_on(url, "2024-05-08");
        let err = t.open_detail(&item).await.unwrap_err();

        assert!(matches!(err, ScrapeError::Transient(_)));
        assert!(!err.is_fatal());
        assert!(t.in_flight().is_empty());
    }

    #[tokio::test]
    async fn failed_profile_run_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/acts/nH2AHrwxeTRJoN5hX/runs"))
            .respond_with(ResponseTemplate::new(201).set_body_json(run("run-1", "ds", "RUNNING")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run("run-1", "ds", "ABORTED")))
            .mount(&server)
            .await;

        let err = transport(&server).open("someaccount").await.unwrap_err();
        assert!(matches!(err, ScrapeError::Fatal(_)));
    }

    #[tokio::test]
    async fn one_failed_comment_run_does_not_end_the_scrape() {
        use crate::pipeline::engine::{FeedScraper, ScrapeOptions};
        use crate::pipeline::stats::StopReason;
        use crate::testing::{emitted_items, window, FixedClassifier, RecordingPacer};

        let server = MockServer::start().await;
        mount_run(&server, "nH2AHrwxeTRJoN5hX", "run-1", "ds-posts").await;
        mount_page(
            &server,
            "ds-posts",
            0,
            json!([post("A", "2024-05-09T10:00:00.000Z", 5), post("B", "2024-05-08T10:00:00.000Z", 7)]),
        )
        .await;
        mount_page(&server, "ds-posts", 2, json!([])).await;

        let url_a = "https://www.instagram.com/reel/A/";
        let url_b = "https://www.instagram.com/reel/B/";
        mount_comment_run(&server, url_a, "run-a", "ds-a", "FAILED").await;
        mount_comment_run(&server, url_b, "run-b", "ds-b", "SUCCEEDED").await;
        mount_page(&server, "ds-b", 0, json!([{ "text": "so good" }])).await;
        mount_page(&server, "ds-b", 1, json!([])).await;

        let mut scraper = FeedScraper::new(
            transport(&server),
            FixedClassifier::new(),
            RecordingPacer::new(),
            ScrapeOptions::default(),
        );
        let mut records = Vec::new();

        let outcome = scraper
            .scrape("someaccount", &window("2024-05-05", "2024-05-09"), &mut records)
            .await
            .unwrap();

        assert_eq!(outcome.reason, StopReason::EndOfFeed);
        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(emitted_items(&records), vec![ItemRef::new(url_b)]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text, "so good");
    }

    #[tokio::test]
    async fn close_aborts_unfinished_runs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/actor-runs/run-stuck/abort"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(run("run-stuck", "ds", "ABORTED")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut t = transport(&server);
        t.in_flight.push("run-stuck".to_string());
        t.close().await.unwrap();

        assert!(t.in_flight().is_empty());
    }
}
