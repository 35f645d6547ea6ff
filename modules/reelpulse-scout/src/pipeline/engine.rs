//! Feed pagination engine.
//!
//! Walks the feed batch by batch, gates each item through the boundary
//! controller, collects comments for accepted items and pushes one
//! classified record per text into the sink. Strictly sequential: the
//! transport session is shared by every step and is closed on every exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use reelpulse_common::{
    FeedItem, MediaKind, ScrapeError, ScrapeFailure, ScrapeTuning, ScrapeWindow, SentimentLabel,
    SentimentRecord, Stage, TextSource,
};

use super::boundary::{self, Verdict};
use super::collector::{CollectorConfig, CommentCollector};
use super::session::ScrapeSession;
use super::stats::{CollectionWarning, ScrapeOutcome, ScrapeProgress, ScrapeStats, StopReason};
use crate::infra::util::with_timeout;
use crate::traits::{FeedTransport, Pacer, RecordSink, SentimentClassifier};

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub collector: CollectorConfig,
    /// Minimum pause before each detail fetch.
    pub detail_delay: Duration,
    /// Deadline for batch reads and advances.
    pub fetch_timeout: Duration,
    /// Deadline for opening the session and a post's detail, which may wait
    /// on a whole scraper run.
    pub run_timeout: Duration,
    pub batch_retries: u32,
    /// Base backoff for batch retries. Actual delay is base * 3^attempt.
    pub retry_backoff: Duration,
    pub max_batches: Option<u32>,
    pub reels_only: bool,
}

impl ScrapeOptions {
    pub fn from_tuning(tuning: &ScrapeTuning) -> Self {
        Self {
            collector: CollectorConfig::from_tuning(tuning),
            detail_delay: tuning.detail_delay(),
            fetch_timeout: tuning.fetch_timeout(),
            run_timeout: tuning.run_timeout(),
            batch_retries: tuning.batch_retries,
            retry_backoff: Duration::from_secs(3),
            max_batches: tuning.max_batches,
            reels_only: tuning.reels_only,
        }
    }
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self::from_tuning(&ScrapeTuning::default())
    }
}

enum ItemOutcome {
    Emitted,
    Skipped,
    SinkClosed,
}

pub struct FeedScraper<T, C, P> {
    transport: T,
    classifier: C,
    pacer: P,
    options: ScrapeOptions,
    collector: CommentCollector,
    abort: Option<Arc<AtomicBool>>,
    progress: Option<watch::Sender<ScrapeProgress>>,
}

impl<T, C, P> FeedScraper<T, C, P>
where
    T: FeedTransport,
    C: SentimentClassifier,
    P: Pacer,
{
    pub fn new(transport: T, classifier: C, pacer: P, options: ScrapeOptions) -> Self {
        let collector = CommentCollector::new(options.collector.clone());
        Self {
            transport,
            classifier,
            pacer,
            options,
            collector,
            abort: None,
            progress: None,
        }
    }

    /// Checked between items; setting it ends the run with `StopReason::Aborted`.
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn with_progress(mut self, sender: watch::Sender<ScrapeProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Scrape `account` for posts inside `window`, pushing records into `sink`.
    ///
    /// Returns why the run stopped, or the fatal error that ended it. The
    /// transport session is released on every path.
    pub async fn scrape(
        &mut self,
        account: &str,
        window: &ScrapeWindow,
        sink: &mut dyn RecordSink,
    ) -> Result<ScrapeOutcome, ScrapeFailure> {
        let account = account.trim();
        if account.is_empty() {
            return Err(ScrapeFailure::new(
                Stage::Validate,
                ScrapeError::Config("target account is required".to_string()),
            ));
        }

        info!(
            account,
            window = %window,
            transport = self.transport.name(),
            "Starting feed scrape"
        );

        let opened = with_timeout(
            self.options.run_timeout,
            "session open",
            self.transport.open(account),
        )
        .await;

        let result = match opened {
            Ok(()) => {
                let mut session = ScrapeSession::new(account);
                self.run(&mut session, window, sink).await
            }
            Err(e) => Err(ScrapeFailure::new(Stage::Open, e)),
        };

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Transport did not close cleanly");
        }

        match &result {
            Ok(outcome) => info!(
                reason = %outcome.reason,
                records = outcome.stats.records_emitted,
                accepted = outcome.stats.accepted,
                failed = outcome.stats.failed,
                "Feed scrape finished"
            ),
            Err(failure) => warn!(error = %failure, "Feed scrape failed"),
        }
        result
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn publish(&self, stats: &ScrapeStats) {
        if let Some(ref sender) = self.progress {
            sender.send_replace(stats.progress());
        }
    }

    async fn run(
        &mut self,
        session: &mut ScrapeSession,
        window: &ScrapeWindow,
        sink: &mut dyn RecordSink,
    ) -> Result<ScrapeOutcome, ScrapeFailure> {
        let mut stats = ScrapeStats::default();
        let done = |reason: StopReason, stats: ScrapeStats| -> Result<ScrapeOutcome, ScrapeFailure> {
            Ok(ScrapeOutcome { reason, stats })
        };

        loop {
            if self.aborted() {
                return done(StopReason::Aborted, stats);
            }
            if let Some(max) = self.options.max_batches {
                if session.cursor() >= max {
                    return done(StopReason::BatchLimit, stats);
                }
            }

            // Re-read from scratch every time; the feed may have rebuilt
            // its elements since the last advance.
            let batch = match self.fetch_batch(session.cursor()).await? {
                Some(batch) => batch,
                None => {
                    info!(batches = stats.batches, "End of feed");
                    return done(StopReason::EndOfFeed, stats);
                }
            };
            let is_first_batch = session.is_first_batch();
            stats.batches += 1;
            debug!(batch = session.cursor(), items = batch.len(), "Batch read");

            for item in &batch {
                if self.aborted() {
                    info!(account = session.account(), "Scrape aborted");
                    return done(StopReason::Aborted, stats);
                }
                if !session.visit(&item.item_ref) {
                    stats.duplicates_skipped += 1;
                    continue;
                }
                stats.items_seen += 1;

                match boundary::evaluate(item, window, is_first_batch) {
                    Verdict::Halt => {
                        info!(
                            item = %item.item_ref,
                            batch = session.cursor(),
                            "Item older than window start, halting"
                        );
                        session.halt(&item.item_ref);
                        break;
                    }
                    Verdict::SkipOutOfRange => {
                        stats.out_of_range += 1;
                        debug!(item = %item.item_ref, "Out of range, skipping");
                        continue;
                    }
                    Verdict::Accept => {}
                }

                if self.options.reels_only && item.kind != MediaKind::Reel {
                    stats.filtered += 1;
                    debug!(item = %item.item_ref, kind = ?item.kind, "Not a reel, skipping");
                    continue;
                }

                stats.accepted += 1;
                match self.process_item(item, window, sink, &mut stats).await? {
                    ItemOutcome::Emitted | ItemOutcome::Skipped => {}
                    ItemOutcome::SinkClosed => {
                        info!("Record sink closed, stopping");
                        return done(StopReason::SinkClosed, stats);
                    }
                }
                self.publish(&stats);
            }

            self.publish(&stats);
            if let Some(at) = session.halted_at() {
                return done(StopReason::BoundaryHalt { item: at.clone() }, stats);
            }
            session.advance();

            match with_timeout(
                self.options.fetch_timeout,
                "advance",
                self.transport.advance(),
            )
            .await
            {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(ScrapeFailure::new(Stage::Advance, e)),
                // The next batch read retries on its own.
                Err(e) => warn!(error = %e, "Advance failed"),
            }
        }
    }

    async fn fetch_batch(&mut self, cursor: u32) -> Result<Option<Vec<FeedItem>>, ScrapeFailure> {
        let mut attempt = 0u32;
        loop {
            let result = with_timeout(
                self.options.fetch_timeout,
                "batch fetch",
                self.transport.next_batch(),
            )
            .await;

            match result {
                Ok(batch) => return Ok(batch),
                Err(e) if e.is_fatal() || attempt >= self.options.batch_retries => {
                    return Err(ScrapeFailure::new(Stage::BatchFetch, e));
                }
                Err(e) => {
                    let backoff = self.options.retry_backoff * 3u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        batch = cursor,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Batch fetch failed, retrying"
                    );
                    self.pacer.pause(backoff).await;
                }
            }
        }
    }

    async fn process_item(
        &mut self,
        item: &FeedItem,
        window: &ScrapeWindow,
        sink: &mut dyn RecordSink,
        stats: &mut ScrapeStats,
    ) -> Result<ItemOutcome, ScrapeFailure> {
        let Some(published) = item.timestamp.as_ref() else {
            return Ok(ItemOutcome::Skipped);
        };

        self.pacer.pause(self.options.detail_delay).await;

        let detail = match with_timeout(
            self.options.run_timeout,
            "detail fetch",
            self.transport.open_detail(item),
        )
        .await
        {
            Ok(detail) => detail,
            Err(e) if e.is_fatal() => {
                return Err(ScrapeFailure::at(Stage::Detail, &item.item_ref, e));
            }
            Err(e) => {
                warn!(item = %item.item_ref, error = %e, "Detail fetch failed, skipping item");
                stats.failed += 1;
                self.release(item).await?;
                return Ok(ItemOutcome::Skipped);
            }
        };

        let caption = detail.caption.or_else(|| item.caption.clone());
        let collected = self
            .collector
            .collect(&mut self.transport, &self.pacer, item, caption.as_deref())
            .await;
        self.release(item).await?;
        let collection =
            collected.map_err(|e| ScrapeFailure::at(Stage::Comments, &item.item_ref, e))?;

        if collection.end.is_warning() {
            stats.warnings.push(CollectionWarning {
                item: item.item_ref.clone(),
                end: collection.end,
                steps: collection.steps,
            });
        }

        let timestamp = window.localize(published);
        let view_count = detail.view_count.or(item.view_count);
        let like_count = detail.like_count.or(item.like_count);
        let has_caption = collection.comments.has_caption();

        for (index, text) in collection.comments.iter().enumerate() {
            let polarity = self.classifier.classify(text).clamp(-1.0, 1.0);
            let source = if index == 0 && has_caption {
                TextSource::Caption
            } else {
                TextSource::Comment
            };
            let record = SentimentRecord {
                item_ref: item.item_ref.clone(),
                timestamp,
                view_count,
                like_count,
                text: text.to_string(),
                polarity,
                label: SentimentLabel::from_score(polarity),
                source,
            };

            if sink.accept(record).is_break() {
                return Ok(ItemOutcome::SinkClosed);
            }
            stats.records_emitted += 1;
        }

        debug!(
            item = %item.item_ref,
            texts = collection.comments.len(),
            end = ?collection.end,
            "Item processed"
        );
        Ok(ItemOutcome::Emitted)
    }

    async fn release(&mut self, item: &FeedItem) -> Result<(), ScrapeFailure> {
        match with_timeout(
            self.options.fetch_timeout,
            "release detail",
            self.transport.release_detail(item),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(ScrapeFailure::at(Stage::Detail, &item.item_ref, e)),
            Err(e) => {
                warn!(item = %item.item_ref, error = %e, "Detail release failed");
                Ok(())
            }
        }
    }
}
