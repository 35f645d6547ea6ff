//! Comment convergence: poll a post's lazily-revealed comment list until the
//! revealed count stops growing for `stagnation_limit` consecutive reads.
//!
//! Feeds return spurious zero-growth steps under latency, so a single
//! non-growing read never ends collection. `max_steps` bounds the loop no
//! matter what the transport reports.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use reelpulse_common::{FeedItem, Result, ScrapeTuning};

use crate::infra::util::with_timeout;
use crate::traits::{FeedTransport, Pacer};

/// Trim and collapse internal whitespace. Empty text normalizes to `None`.
pub fn normalize(text: &str) -> Option<String> {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Ordered, deduplicated texts of one post. The caption, when present, is
/// always first.
#[derive(Debug, Clone, Default)]
pub struct CommentSet {
    texts: Vec<String>,
    seen: HashSet<String>,
    has_caption: bool,
}

impl CommentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caption(caption: Option<&str>) -> Self {
        let mut set = Self::new();
        if let Some(caption) = caption {
            set.has_caption = set.insert(caption);
        }
        set
    }

    /// Returns `true` if the normalized text was not already present.
    pub fn insert(&mut self, text: &str) -> bool {
        let Some(normalized) = normalize(text) else {
            return false;
        };
        if !self.seen.insert(normalized.clone()) {
            return false;
        }
        self.texts.push(normalized);
        true
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn has_caption(&self) -> bool {
        self.has_caption
    }

    pub fn caption(&self) -> Option<&str> {
        if self.has_caption {
            self.texts.first().map(String::as_str)
        } else {
            None
        }
    }

    /// Texts excluding the caption.
    pub fn comment_count(&self) -> usize {
        self.texts.len() - usize::from(self.has_caption)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.texts.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionEnd {
    /// Revealed count did not grow for `stagnation_limit` reads.
    Converged,
    /// `max_comments` reached.
    CapReached,
    /// `max_steps` reached before convergence.
    SafetyCeilingExceeded,
    /// The comment list never became readable.
    Unavailable,
}

impl CollectionEnd {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            CollectionEnd::SafetyCeilingExceeded | CollectionEnd::Unavailable
        )
    }
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub comments: CommentSet,
    pub end: CollectionEnd,
    pub steps: u32,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub stagnation_limit: u32,
    pub max_steps: u32,
    pub step_delay: Duration,
    pub read_timeout: Duration,
    pub max_comments: Option<u32>,
}

impl CollectorConfig {
    pub fn from_tuning(tuning: &ScrapeTuning) -> Self {
        Self {
            stagnation_limit: tuning.stagnation_limit,
            max_steps: tuning.max_collect_steps,
            step_delay: tuning.comment_step_delay(),
            read_timeout: tuning.fetch_timeout(),
            max_comments: tuning.max_comments_per_post,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::from_tuning(&ScrapeTuning::default())
    }
}

pub struct CommentCollector {
    config: CollectorConfig,
}

impl CommentCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    fn cap_reached(&self, set: &CommentSet) -> bool {
        self.config
            .max_comments
            .is_some_and(|cap| set.comment_count() >= cap as usize)
    }

    /// Collect the comments of an item whose detail view is open.
    /// Only fatal transport errors are returned as `Err`.
    pub async fn collect<T, P>(
        &self,
        transport: &mut T,
        pacer: &P,
        item: &FeedItem,
        caption: Option<&str>,
    ) -> Result<Collection>
    where
        T: FeedTransport + ?Sized,
        P: Pacer + ?Sized,
    {
        let stagnation_limit = self.config.stagnation_limit.max(1);
        let mut set = CommentSet::with_caption(caption);
        let mut high_count: Option<usize> = None;
        let mut stable_reads = 0u32;
        let mut steps = 0u32;

        let finish = |comments: CommentSet, end: CollectionEnd, steps: u32| Collection {
            comments,
            end,
            steps,
        };

        if self.cap_reached(&set) {
            return Ok(finish(set, CollectionEnd::CapReached, steps));
        }

        loop {
            if steps >= self.config.max_steps {
                warn!(
                    item = %item.item_ref,
                    steps,
                    collected = set.comment_count(),
                    "Comment collection hit the step ceiling"
                );
                return Ok(finish(set, CollectionEnd::SafetyCeilingExceeded, steps));
            }
            steps += 1;

            let read = with_timeout(
                self.config.read_timeout,
                "comment read",
                transport.revealed_comments(item),
            )
            .await;

            match read {
                Ok(revealed) => {
                    for text in &revealed {
                        set.insert(text);
                        if self.cap_reached(&set) {
                            debug!(item = %item.item_ref, steps, "Comment cap reached");
                            return Ok(finish(set, CollectionEnd::CapReached, steps));
                        }
                    }

                    // Only growth past the highest count seen resets the run;
                    // a list that re-renders shorter has not grown.
                    let count = revealed.len();
                    match high_count {
                        Some(high) if count <= high => stable_reads += 1,
                        _ => {
                            stable_reads = 1;
                            high_count = Some(count);
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if high_count.is_none() => {
                    warn!(item = %item.item_ref, error = %e, "Comment list unavailable, keeping caption only");
                    return Ok(finish(set, CollectionEnd::Unavailable, steps));
                }
                Err(e) => {
                    // A failed read shows no growth.
                    debug!(item = %item.item_ref, error = %e, "Comment read failed");
                    stable_reads += 1;
                }
            }

            if stable_reads >= stagnation_limit {
                debug!(
                    item = %item.item_ref,
                    steps,
                    collected = set.comment_count(),
                    "Comment list converged"
                );
                return Ok(finish(set, CollectionEnd::Converged, steps));
            }

            match with_timeout(
                self.config.read_timeout,
                "reveal more",
                transport.reveal_more(item),
            )
            .await
            {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(item = %item.item_ref, error = %e, "Reveal request failed"),
            }

            pacer.pause(self.config.step_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn collector(stagnation_limit: u32, max_steps: u32) -> CommentCollector {
        CommentCollector::new(CollectorConfig {
            stagnation_limit,
            max_steps,
            step_delay: Duration::from_millis(500),
            read_timeout: Duration::from_secs(5),
            max_comments: None,
        })
    }

    #[test]
    fn same_text_twice_is_kept_once() {
        let mut set = CommentSet::new();
        assert!(set.insert("so good"));
        assert!(!set.insert("  so   good "));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn caption_is_first_and_not_counted_as_comment() {
        let mut set = CommentSet::with_caption(Some("Morning light"));
        set.insert("love it");
        set.insert("Morning light");

        assert_eq!(set.caption(), Some("Morning light"));
        assert_eq!(set.comment_count(), 1);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["Morning light", "love it"]);
    }

    #[test]
    fn blank_text_is_ignored() {
        let mut set = CommentSet::with_caption(Some("   "));
        assert!(!set.has_caption());
        assert!(!set.insert("\n\t"));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn stops_on_fifth_consecutive_read_of_same_count() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let mut transport = ScriptedTransport::new().on_comments(
            &item.item_ref,
            comments_growing(&[1, 3, 3, 3, 3, 3, 7, 7, 7, 7, 7]),
        );
        let pacer = RecordingPacer::new();

        let collection = collector(5, 200)
            .collect(&mut transport, &pacer, &item, None)
            .await
            .unwrap();

        assert_eq!(collection.end, CollectionEnd::Converged);
        assert_eq!(collection.steps, 6);
        assert_eq!(collection.comments.comment_count(), 3);
        assert_eq!(transport.comment_reads(&item.item_ref), 6);
    }

    #[tokio::test]
    async fn growth_resets_stagnation() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let mut transport = ScriptedTransport::new()
            .on_comments(&item.item_ref, comments_growing(&[2, 2, 5, 5, 5]));
        let pacer = RecordingPacer::new();

        let collection = collector(3, 200)
            .collect(&mut transport, &pacer, &item, Some("caption"))
            .await
            .unwrap();

        assert_eq!(collection.end, CollectionEnd::Converged);
        assert_eq!(collection.steps, 5);
        assert_eq!(collection.comments.comment_count(), 5);
        assert_eq!(collection.comments.caption(), Some("caption"));
    }

    #[tokio::test]
    async fn shrinking_list_counts_as_no_growth() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let counts: Vec<usize> = (1..=60).rev().collect();
        let mut transport =
            ScriptedTransport::new().on_comments(&item.item_ref, comments_growing(&counts));
        let pacer = RecordingPacer::new();

        let collection = collector(5, 40)
            .collect(&mut transport, &pacer, &item, None)
            .await
            .unwrap();

        assert_eq!(collection.end, CollectionEnd::Converged);
        assert_eq!(collection.steps, 5);
        assert_eq!(collection.comments.comment_count(), 60);
    }

    #[tokio::test]
    async fn dip_then_growth_past_high_mark_resets() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let mut transport = ScriptedTransport::new()
            .on_comments(&item.item_ref, comments_growing(&[4, 2, 6, 6, 6]));
        let pacer = RecordingPacer::new();

        let collection = collector(3, 200)
            .collect(&mut transport, &pacer, &item, None)
            .await
            .unwrap();

        assert_eq!(collection.end, CollectionEnd::Converged);
        assert_eq!(collection.steps, 5);
        assert_eq!(collection.comments.comment_count(), 6);
    }

    #[tokio::test]
    async fn step_ceiling_returns_partial_collection() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let counts: Vec<usize> = (1..=50).collect();
        let mut transport =
            ScriptedTransport::new().on_comments(&item.item_ref, comments_growing(&counts));
        let pacer = RecordingPacer::new();

        let collection = collector(5, 10)
            .collect(&mut transport, &pacer, &item, None)
            .await
            .unwrap();

        assert_eq!(collection.end, CollectionEnd::SafetyCeilingExceeded);
        assert!(collection.end.is_warning());
        assert_eq!(collection.steps, 10);
        assert_eq!(collection.comments.comment_count(), 10);
    }

    #[tokio::test]
    async fn unreadable_comment_list_keeps_caption_only() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let mut transport = ScriptedTransport::new()
            .on_comments(&item.item_ref, comments_growing(&[4]))
            .fail_comment_read(&item.item_ref, 0, MockFailure::Transient);
        let pacer = RecordingPacer::new();

        let collection = collector(5, 200)
            .collect(&mut transport, &pacer, &item, Some("just the caption"))
            .await
            .unwrap();

        assert_eq!(collection.end, CollectionEnd::Unavailable);
        assert_eq!(
            collection.comments.iter().collect::<Vec<_>>(),
            vec!["just the caption"]
        );
    }

    #[tokio::test]
    async fn later_transient_read_counts_as_stagnant() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let mut transport = ScriptedTransport::new()
            .on_comments(&item.item_ref, comments_growing(&[2, 2, 2]))
            .fail_comment_read(&item.item_ref, 1, MockFailure::Transient);
        let pacer = RecordingPacer::new();

        let collection = collector(3, 200)
            .collect(&mut transport, &pacer, &item, None)
            .await
            .unwrap();

        assert_eq!(collection.end, CollectionEnd::Converged);
        assert_eq!(collection.steps, 3);
        assert_eq!(collection.comments.comment_count(), 2);
    }

    #[tokio::test]
    async fn fatal_read_error_propagates() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let mut transport = ScriptedTransport::new()
            .on_comments(&item.item_ref, comments_growing(&[2, 3]))
            .fail_comment_read(&item.item_ref, 1, MockFailure::Fatal);
        let pacer = RecordingPacer::new();

        let result = collector(5, 200)
            .collect(&mut transport, &pacer, &item, None)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn comment_cap_stops_collection() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let mut transport = ScriptedTransport::new()
            .on_comments(&item.item_ref, comments_growing(&[3, 6, 9, 12]));
        let pacer = RecordingPacer::new();
        let collector = CommentCollector::new(CollectorConfig {
            max_comments: Some(4),
            ..CollectorConfig::default()
        });

        let collection = collector
            .collect(&mut transport, &pacer, &item, Some("caption"))
            .await
            .unwrap();

        assert_eq!(collection.end, CollectionEnd::CapReached);
        assert_eq!(collection.comments.comment_count(), 4);
        assert_eq!(collection.comments.len(), 5);
    }

    #[tokio::test]
    async fn pauses_between_steps_with_configured_delay() {
        let item = item_on("https://www.instagram.com/reel/A/", "2024-05-08");
        let mut transport = ScriptedTransport::new()
            .on_comments(&item.item_ref, comments_growing(&[1, 1]));
        let pacer = RecordingPacer::new();

        collector(2, 200)
            .collect(&mut transport, &pacer, &item, None)
            .await
            .unwrap();

        assert_eq!(pacer.pauses(), vec![Duration::from_millis(500)]);
        assert_eq!(transport.reveal_requests(&item.item_ref), 1);
    }
}
