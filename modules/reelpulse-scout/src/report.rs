//! Overview, per-post drill-down and CSV export over emitted records.
//!
//! Totals are computed per unique post, never per record, and posts whose
//! views or likes are unknown are left out of the sum and counted instead.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use csv::Writer;

use reelpulse_common::{ItemRef, ScrapeWindow, SentimentLabel, SentimentRecord, TextSource};

pub const CSV_HEADER: [&str; 8] = [
    "URL",
    "Views",
    "Date",
    "Time",
    "Likes",
    "Comment",
    "Sentiment_Label",
    "Sentiment_Score",
];

/// Unknown metrics render as `N/A`.
pub fn format_metric(value: Option<u64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "N/A".to_string(),
    }
}

// --- Aggregates ---

/// Sum over posts with a known value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricTotal {
    pub total: u64,
    pub known: usize,
    pub unknown: usize,
}

impl MetricTotal {
    fn add(&mut self, value: Option<u64>) {
        match value {
            Some(v) => {
                self.total = self.total.saturating_add(v);
                self.known += 1;
            }
            None => self.unknown += 1,
        }
    }
}

impl fmt::Display for MetricTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.total)?;
        if self.unknown > 0 {
            write!(f, " ({} post(s) with unknown value excluded)", self.unknown)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SentimentSplit {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentSplit {
    pub fn from_labels(labels: impl IntoIterator<Item = SentimentLabel>) -> Self {
        let mut split = Self::default();
        for label in labels {
            match label {
                SentimentLabel::Positive => split.positive += 1,
                SentimentLabel::Negative => split.negative += 1,
                SentimentLabel::Neutral => split.neutral += 1,
            }
        }
        split
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }

    /// Share of `label` in percent. 0.0 when there is nothing to split.
    pub fn percent(&self, label: SentimentLabel) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let count = match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Negative => self.negative,
            SentimentLabel::Neutral => self.neutral,
        };
        count as f64 * 100.0 / total as f64
    }
}

impl fmt::Display for SentimentSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "no texts");
        }
        write!(
            f,
            "Positive {:.1}% | Negative {:.1}% | Neutral {:.1}%",
            self.percent(SentimentLabel::Positive),
            self.percent(SentimentLabel::Negative),
            self.percent(SentimentLabel::Neutral),
        )
    }
}

// --- Per post ---

/// Everything emitted for one post.
#[derive(Debug)]
pub struct PostSummary<'a> {
    pub item_ref: &'a ItemRef,
    pub timestamp: DateTime<FixedOffset>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub caption: Option<&'a SentimentRecord>,
    pub comments: Vec<&'a SentimentRecord>,
}

impl PostSummary<'_> {
    pub fn comment_split(&self) -> SentimentSplit {
        SentimentSplit::from_labels(self.comments.iter().map(|r| r.label))
    }
}

impl fmt::Display for PostSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== {} ===", self.item_ref)?;
        if let Some(caption) = self.caption {
            writeln!(f, "Caption: {}", caption.text)?;
        }
        writeln!(
            f,
            "Date: {} | Time: {}",
            self.timestamp.format("%Y-%m-%d"),
            self.timestamp.format("%H:%M:%S")
        )?;
        writeln!(
            f,
            "Views: {} | Likes: {}",
            format_metric(self.view_count),
            format_metric(self.like_count)
        )?;
        writeln!(f, "Sentiment split: {}", self.comment_split())?;
        if !self.comments.is_empty() {
            writeln!(f, "Comments:")?;
            for record in &self.comments {
                writeln!(
                    f,
                    "  [{:<8} {:>6.3}] {}",
                    record.label.as_str(),
                    record.polarity,
                    record.text
                )?;
            }
        }
        Ok(())
    }
}

// --- Overview ---

#[derive(Debug)]
pub struct Overview<'a> {
    pub account: &'a str,
    pub window: &'a ScrapeWindow,
    pub posts: usize,
    pub records: usize,
    pub likes: MetricTotal,
    pub views: MetricTotal,
    pub split: SentimentSplit,
}

impl fmt::Display for Overview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Overview: {} ({}) ===", self.account, self.window)?;
        writeln!(f, "Posts:          {}", self.posts)?;
        writeln!(f, "Texts analysed: {}", self.records)?;
        writeln!(f, "Total likes:    {}", self.likes)?;
        writeln!(f, "Total views:    {}", self.views)?;
        writeln!(f, "Sentiment:      {}", self.split)
    }
}

/// Records grouped by post, in emission order.
pub struct Report<'a> {
    account: &'a str,
    window: &'a ScrapeWindow,
    records: &'a [SentimentRecord],
    posts: Vec<PostSummary<'a>>,
}

impl<'a> Report<'a> {
    pub fn build(account: &'a str, window: &'a ScrapeWindow, records: &'a [SentimentRecord]) -> Self {
        let mut posts: Vec<PostSummary<'a>> = Vec::new();
        let mut index: HashMap<&ItemRef, usize> = HashMap::new();

        for record in records {
            let slot = *index.entry(&record.item_ref).or_insert_with(|| {
                posts.push(PostSummary {
                    item_ref: &record.item_ref,
                    timestamp: record.timestamp,
                    view_count: record.view_count,
                    like_count: record.like_count,
                    caption: None,
                    comments: Vec::new(),
                });
                posts.len() - 1
            });
            let post = &mut posts[slot];
            match record.source {
                TextSource::Caption => post.caption = Some(record),
                TextSource::Comment => post.comments.push(record),
            }
        }

        Self {
            account,
            window,
            records,
            posts,
        }
    }

    pub fn posts(&self) -> &[PostSummary<'a>] {
        &self.posts
    }

    pub fn post(&self, url: &str) -> Option<&PostSummary<'a>> {
        self.posts.iter().find(|p| p.item_ref.as_str() == url)
    }

    pub fn overview(&self) -> Overview<'a> {
        let mut likes = MetricTotal::default();
        let mut views = MetricTotal::default();
        for post in &self.posts {
            likes.add(post.like_count);
            views.add(post.view_count);
        }

        Overview {
            account: self.account,
            window: self.window,
            posts: self.posts.len(),
            records: self.records.len(),
            likes,
            views,
            split: SentimentSplit::from_labels(self.records.iter().map(|r| r.label)),
        }
    }
}

// --- CSV ---

pub fn write_csv<W: io::Write>(writer: W, records: &[SentimentRecord]) -> Result<()> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(CSV_HEADER)?;

    for record in records {
        writer.write_record([
            record.item_ref.to_string(),
            format_metric(record.view_count),
            record.timestamp.format("%Y-%m-%d").to_string(),
            record.timestamp.format("%H:%M:%S").to_string(),
            format_metric(record.like_count),
            record.text.clone(),
            record.label.to_string(),
            record.polarity.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn save_csv(path: &Path, records: &[SentimentRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    write_csv(file, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(url: &str, source: TextSource, text: &str, polarity: f64) -> SentimentRecord {
        SentimentRecord {
            item_ref: ItemRef::new(url),
            timestamp: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 5, 8, 14, 3, 9)
                .unwrap(),
            view_count: None,
            like_count: None,
            text: text.to_string(),
            polarity,
            label: SentimentLabel::from_score(polarity),
            source,
        }
    }

    fn with_metrics(mut r: SentimentRecord, views: Option<u64>, likes: Option<u64>) -> SentimentRecord {
        r.view_count = views;
        r.like_count = likes;
        r
    }

    fn sample() -> Vec<SentimentRecord> {
        vec![
            with_metrics(record("A", TextSource::Caption, "Sunset", 0.0), Some(1_000), Some(50)),
            with_metrics(record("A", TextSource::Comment, "love it", 0.5), Some(1_000), Some(50)),
            with_metrics(record("A", TextSource::Comment, "meh, bad", -0.7), Some(1_000), Some(50)),
            with_metrics(record("B", TextSource::Comment, "great", 0.8), None, Some(7)),
            with_metrics(record("C", TextSource::Comment, "ok", 0.0), Some(300), None),
        ]
    }

    fn window() -> ScrapeWindow {
        ScrapeWindow::new("2024-05-05".parse().unwrap(), "2024-05-09".parse().unwrap()).unwrap()
    }

    #[test]
    fn totals_count_each_post_once_and_exclude_unknowns() {
        let records = sample();
        let w = window();
        let overview = Report::build("someaccount", &w, &records).overview();

        assert_eq!(overview.posts, 3);
        assert_eq!(overview.records, 5);
        assert_eq!(
            overview.likes,
            MetricTotal {
                total: 57,
                known: 2,
                unknown: 1
            }
        );
        assert_eq!(
            overview.views,
            MetricTotal {
                total: 1_300,
                known: 2,
                unknown: 1
            }
        );
        assert!(overview.to_string().contains("1 post(s) with unknown value excluded"));
    }

    #[test]
    fn split_percentages() {
        let split = SentimentSplit::from_labels([
            SentimentLabel::Positive,
            SentimentLabel::Positive,
            SentimentLabel::Negative,
            SentimentLabel::Neutral,
        ]);
        assert_eq!(split.percent(SentimentLabel::Positive), 50.0);
        assert_eq!(split.percent(SentimentLabel::Neutral), 25.0);
        assert_eq!(SentimentSplit::default().percent(SentimentLabel::Positive), 0.0);
    }

    #[test]
    fn drill_down_separates_caption_from_comments() {
        let records = sample();
        let w = window();
        let report = Report::build("someaccount", &w, &records);

        let a = report.post("A").unwrap();
        assert_eq!(a.caption.map(|r| r.text.as_str()), Some("Sunset"));
        assert_eq!(a.comments.len(), 2);
        assert_eq!(a.comment_split().positive, 1);

        let b = report.post("B").unwrap();
        assert!(b.caption.is_none());
        let rendered = b.to_string();
        assert!(!rendered.contains("Caption:"));
        assert!(rendered.contains("Views: N/A | Likes: 7"));

        assert!(report.post("missing").is_none());
    }

    #[test]
    fn csv_has_header_and_na_for_unknowns() {
        let records = sample();
        let mut out = Vec::new();
        write_csv(&mut out, &records).unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("URL,Views,Date,Time,Likes,Comment,Sentiment_Label,Sentiment_Score")
        );
        assert_eq!(lines.next(), Some("A,1000,2024-05-08,14:03:09,50,Sunset,Neutral,0"));
        assert!(text.contains("B,N/A,2024-05-08,14:03:09,7,great,Positive,0.8"));
        assert!(text.contains("\"meh, bad\""));
    }

    #[test]
    fn save_csv_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reels.csv");
        save_csv(&path, &sample()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn csv_round_trips_through_reader() {
        let records = sample();
        let mut out = Vec::new();
        write_csv(&mut out, &records).unwrap();

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), records.len());
        assert_eq!(&rows[4][4], "N/A");
    }
}
