use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};

// --- Feed items ---

/// Opaque identity of a feed item. In practice the post permalink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemRef(String);

impl ItemRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Reel,
    Image,
    Carousel,
    #[default]
    Unknown,
}

/// A post as read from one page of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub item_ref: ItemRef,
    /// `None` when the feed entry carried no readable date.
    pub timestamp: Option<DateTime<Utc>>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub caption: Option<String>,
    pub kind: MediaKind,
}

impl FeedItem {
    /// An item with nothing known about it but its reference.
    pub fn new(item_ref: ItemRef) -> Self {
        Self {
            item_ref,
            timestamp: None,
            view_count: None,
            like_count: None,
            caption: None,
            kind: MediaKind::Unknown,
        }
    }
}

// --- Scrape window ---

/// Inclusive calendar-date bounds, evaluated in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeWindow {
    start: NaiveDate,
    end: NaiveDate,
    offset: FixedOffset,
}

impl ScrapeWindow {
    /// Rejects windows whose start falls after their end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ScrapeError::InvalidWindow { start, end });
        }
        Ok(Self {
            start,
            end,
            offset: utc_offset(),
        })
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn localize(&self, ts: &DateTime<Utc>) -> DateTime<FixedOffset> {
        ts.with_timezone(&self.offset)
    }

    /// Calendar date of `ts` in the window's offset.
    pub fn local_date(&self, ts: &DateTime<Utc>) -> NaiveDate {
        self.localize(ts).date_naive()
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        let date = self.local_date(ts);
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for ScrapeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

// --- Sentiment records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > 0.0 {
            SentimentLabel::Positive
        } else if score < 0.0 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Negative => "Negative",
            SentimentLabel::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    Caption,
    Comment,
}

/// One classified text unit of one post. The unit the report layer consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentRecord {
    pub item_ref: ItemRef,
    /// Publication time in the window's offset.
    pub timestamp: DateTime<FixedOffset>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub text: String,
    pub polarity: f64,
    pub label: SentimentLabel,
    pub source: TextSource,
}

impl SentimentRecord {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}
