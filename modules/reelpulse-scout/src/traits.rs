// Trait seams for the feed scraper.
//
// FeedTransport: everything that touches the network (profile pages, post
//   detail, comment revelation). Two implementations (Apify API, browser).
// SentimentClassifier: text → polarity in [-1, 1].
// RecordSink: where emitted records go.
// Pacer: every deliberate wait, so tests run without real delays.

use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;

use reelpulse_common::{FeedItem, Result, SentimentRecord};

/// Metadata read when a post is opened for detail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDetail {
    pub caption: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
}

// ---------------------------------------------------------------------------
// FeedTransport
// ---------------------------------------------------------------------------

/// One authenticated session against a feed. Owned by a single scrape and
/// used strictly sequentially.
#[async_trait]
pub trait FeedTransport: Send {
    /// Acquire the session and resolve the account.
    async fn open(&mut self, account: &str) -> Result<()>;

    /// Read the batch at the current position. `None` means the feed is
    /// exhausted. Called fresh after every advance.
    async fn next_batch(&mut self) -> Result<Option<Vec<FeedItem>>>;

    /// Move to the next page / scroll position.
    async fn advance(&mut self) -> Result<()>;

    /// Open a post's detail view.
    async fn open_detail(&mut self, item: &FeedItem) -> Result<ItemDetail>;

    /// Comment texts currently revealed in the open detail view.
    async fn revealed_comments(&mut self, item: &FeedItem) -> Result<Vec<String>>;

    /// Ask the detail view to reveal more comments.
    async fn reveal_more(&mut self, item: &FeedItem) -> Result<()>;

    /// Done with this item's detail view.
    async fn release_detail(&mut self, _item: &FeedItem) -> Result<()> {
        Ok(())
    }

    /// Release the session. Must be safe to call after a failed `open`.
    async fn close(&mut self) -> Result<()>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// SentimentClassifier
// ---------------------------------------------------------------------------

pub trait SentimentClassifier: Send + Sync {
    /// Polarity in [-1, 1]. Positive above zero, negative below.
    fn classify(&self, text: &str) -> f64;
}

// ---------------------------------------------------------------------------
// RecordSink
// ---------------------------------------------------------------------------

pub trait RecordSink: Send {
    /// `Break` tells the scraper the consumer wants no more records.
    fn accept(&mut self, record: SentimentRecord) -> ControlFlow<()>;
}

impl RecordSink for Vec<SentimentRecord> {
    fn accept(&mut self, record: SentimentRecord) -> ControlFlow<()> {
        self.push(record);
        ControlFlow::Continue(())
    }
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Real wall-clock pauses.
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
