// Test mocks for the feed scraper.
//
// Three mocks matching the trait boundaries:
// - ScriptedTransport (FeedTransport): batches, details and comment reads
//   played back from a script, with injectable failures
// - FixedClassifier (SentimentClassifier): text→score lookup
// - RecordingPacer (Pacer): records pauses instead of sleeping
//
// Plus helpers for building dated items, windows and growing comment lists.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::ControlFlow;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use reelpulse_common::{
    FeedItem, ItemRef, MediaKind, Result, ScrapeError, ScrapeWindow, SentimentRecord,
};

use crate::traits::{FeedTransport, ItemDetail, Pacer, RecordSink, SentimentClassifier};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A reel published at noon UTC on `date` (`YYYY-MM-DD`).
pub fn item_on(url: &str, date: &str) -> FeedItem {
    let day: NaiveDate = date.parse().expect("test date must be YYYY-MM-DD");
    let noon = day.and_hms_opt(12, 0, 0).expect("valid time");
    FeedItem {
        timestamp: Some(Utc.from_utc_datetime(&noon)),
        kind: MediaKind::Reel,
        ..FeedItem::new(ItemRef::new(url))
    }
}

pub fn window(start: &str, end: &str) -> ScrapeWindow {
    ScrapeWindow::new(
        start.parse().expect("test date must be YYYY-MM-DD"),
        end.parse().expect("test date must be YYYY-MM-DD"),
    )
    .expect("test window must be ordered")
}

/// One comment read per entry, revealing `"comment 1"` .. `"comment n"`.
pub fn comments_growing(counts: &[usize]) -> Vec<Vec<String>> {
    counts
        .iter()
        .map(|&n| (1..=n).map(|i| format!("comment {i}")).collect())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Transient,
    Fatal,
    Auth,
    NotFound,
}

impl MockFailure {
    pub fn to_error(self) -> ScrapeError {
        match self {
            MockFailure::Transient => ScrapeError::Transient("scripted timeout".into()),
            MockFailure::Fatal => ScrapeError::Fatal("scripted connection loss".into()),
            MockFailure::Auth => ScrapeError::AuthenticationFailure("scripted login rejected".into()),
            MockFailure::NotFound => ScrapeError::AccountNotFound("scripted missing account".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// Feed transport that plays back a script.
/// Builder pattern: `.with_batches()`, `.on_detail()`, `.on_comments()`, `.fail_*()`.
///
/// Comment reads past the end of an item's script repeat the last entry.
/// Items with no comment script reveal nothing.
#[derive(Default)]
pub struct ScriptedTransport {
    batches: Vec<Vec<FeedItem>>,
    position: usize,
    open_failure: Option<MockFailure>,
    batch_failures: HashMap<usize, VecDeque<MockFailure>>,
    advance_failures: VecDeque<MockFailure>,
    details: HashMap<ItemRef, ItemDetail>,
    detail_failures: HashMap<ItemRef, MockFailure>,
    comments: HashMap<ItemRef, Vec<Vec<String>>>,
    comment_failures: HashMap<(ItemRef, usize), MockFailure>,
    run_latency: Duration,

    opened_accounts: Vec<String>,
    closes: u32,
    batch_reads: u32,
    advances: u32,
    detail_requests: Vec<ItemRef>,
    comment_reads: HashMap<ItemRef, usize>,
    reveal_requests: HashMap<ItemRef, usize>,
    released: Vec<ItemRef>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batches(mut self, batches: Vec<Vec<FeedItem>>) -> Self {
        self.batches = batches;
        self
    }

    pub fn on_detail(mut self, item: &ItemRef, detail: ItemDetail) -> Self {
        self.details.insert(item.clone(), detail);
        self
    }

    pub fn on_comments(mut self, item: &ItemRef, reads: Vec<Vec<String>>) -> Self {
        self.comments.insert(item.clone(), reads);
        self
    }

    pub fn fail_open(mut self, failure: MockFailure) -> Self {
        self.open_failure = Some(failure);
        self
    }

    /// Fail the read of batch `index` once per call, before it succeeds.
    pub fn fail_batch(mut self, index: usize, failure: MockFailure) -> Self {
        self.batch_failures
            .entry(index)
            .or_default()
            .push_back(failure);
        self
    }

    pub fn fail_advance(mut self, failure: MockFailure) -> Self {
        self.advance_failures.push_back(failure);
        self
    }

    pub fn fail_detail(mut self, item: &ItemRef, failure: MockFailure) -> Self {
        self.detail_failures.insert(item.clone(), failure);
        self
    }

    /// Fail the `read_index`-th (zero-based) comment read of `item`.
    pub fn fail_comment_read(mut self, item: &ItemRef, read_index: usize, failure: MockFailure) -> Self {
        self.comment_failures.insert((item.clone(), read_index), failure);
        self
    }

    /// Make `open` and `open_detail` take `latency` of wall time, like an
    /// actor run that has to finish before anything can be read.
    pub fn slow_runs(mut self, latency: Duration) -> Self {
        self.run_latency = latency;
        self
    }

    async fn run_wait(&self) {
        if !self.run_latency.is_zero() {
            tokio::time::sleep(self.run_latency).await;
        }
    }

    pub fn opened_accounts(&self) -> &[String] {
        &self.opened_accounts
    }

    pub fn closes(&self) -> u32 {
        self.closes
    }

    pub fn batch_reads(&self) -> u32 {
        self.batch_reads
    }

    pub fn advances(&self) -> u32 {
        self.advances
    }

    pub fn detail_requests(&self) -> &[ItemRef] {
        &self.detail_requests
    }

    pub fn requested_detail(&self, item: &ItemRef) -> bool {
        self.detail_requests.contains(item)
    }

    pub fn comment_reads(&self, item: &ItemRef) -> usize {
        self.comment_reads.get(item).copied().unwrap_or(0)
    }

    pub fn reveal_requests(&self, item: &ItemRef) -> usize {
        self.reveal_requests.get(item).copied().unwrap_or(0)
    }

    pub fn released(&self) -> &[ItemRef] {
        &self.released
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn open(&mut self, account: &str) -> Result<()> {
        self.opened_accounts.push(account.to_string());
        self.run_wait().await;
        match self.open_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<FeedItem>>> {
        self.batch_reads += 1;
        if let Some(failure) = self
            .batch_failures
            .get_mut(&self.position)
            .and_then(VecDeque::pop_front)
        {
            return Err(failure.to_error());
        }
        Ok(self.batches.get(self.position).cloned())
    }

    async fn advance(&mut self) -> Result<()> {
        self.advances += 1;
        if let Some(failure) = self.advance_failures.pop_front() {
            return Err(failure.to_error());
        }
        self.position += 1;
        Ok(())
    }

    async fn open_detail(&mut self, item: &FeedItem) -> Result<ItemDetail> {
        self.detail_requests.push(item.item_ref.clone());
        self.run_wait().await;
        if let Some(failure) = self.detail_failures.get(&item.item_ref) {
            return Err(failure.to_error());
        }
        Ok(self
            .details
            .get(&item.item_ref)
            .cloned()
            .unwrap_or_default())
    }

    async fn revealed_comments(&mut self, item: &FeedItem) -> Result<Vec<String>> {
        let reads = self.comment_reads.entry(item.item_ref.clone()).or_insert(0);
        let index = *reads;
        *reads += 1;

        if let Some(failure) = self.comment_failures.get(&(item.item_ref.clone(), index)) {
            return Err(failure.to_error());
        }
        let revealed = self
            .comments
            .get(&item.item_ref)
            .and_then(|script| script.get(index).or_else(|| script.last()))
            .cloned()
            .unwrap_or_default();
        Ok(revealed)
    }

    async fn reveal_more(&mut self, item: &FeedItem) -> Result<()> {
        *self.reveal_requests.entry(item.item_ref.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn release_detail(&mut self, item: &FeedItem) -> Result<()> {
        self.released.push(item.item_ref.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closes += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// FixedClassifier
// ---------------------------------------------------------------------------

/// Returns the registered score for a text, 0.0 otherwise.
#[derive(Default)]
pub struct FixedClassifier {
    scores: HashMap<String, f64>,
}

impl FixedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, text: &str, score: f64) -> Self {
        self.scores.insert(text.to_string(), score);
        self
    }
}

impl SentimentClassifier for FixedClassifier {
    fn classify(&self, text: &str) -> f64 {
        self.scores.get(text).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// RecordingPacer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().expect("pacer lock").clone()
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().expect("pacer lock").push(duration);
    }
}

// ---------------------------------------------------------------------------
// LimitedSink
// ---------------------------------------------------------------------------

/// Accepts `limit` records, then breaks.
pub struct LimitedSink {
    pub records: Vec<SentimentRecord>,
    limit: usize,
}

impl LimitedSink {
    pub fn new(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            limit,
        }
    }
}

impl RecordSink for LimitedSink {
    fn accept(&mut self, record: SentimentRecord) -> ControlFlow<()> {
        if self.records.len() >= self.limit {
            return ControlFlow::Break(());
        }
        self.records.push(record);
        ControlFlow::Continue(())
    }
}

/// Distinct item refs in emission order.
pub fn emitted_items(records: &[SentimentRecord]) -> Vec<ItemRef> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.item_ref.clone()))
        .map(|r| r.item_ref.clone())
        .collect()
}
