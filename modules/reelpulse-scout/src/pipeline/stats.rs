use reelpulse_common::ItemRef;

use super::collector::CollectionEnd;

/// Snapshot published to observers while a scrape runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeProgress {
    pub batches: u32,
    pub items_seen: u32,
    pub items_accepted: u32,
    pub records_emitted: u32,
}

/// A post whose comments were collected only partially.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionWarning {
    pub item: ItemRef,
    pub end: CollectionEnd,
    pub steps: u32,
}

/// Why a run that did not fail stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    EndOfFeed,
    /// An item older than the window start past the first batch.
    BoundaryHalt { item: ItemRef },
    Aborted,
    /// The record sink asked for no more records.
    SinkClosed,
    BatchLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndOfFeed => write!(f, "end of feed"),
            StopReason::BoundaryHalt { item } => write!(f, "boundary halt at {item}"),
            StopReason::Aborted => write!(f, "aborted"),
            StopReason::SinkClosed => write!(f, "record sink closed"),
            StopReason::BatchLimit => write!(f, "batch limit reached"),
        }
    }
}

/// Stats from a scrape run.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub batches: u32,
    pub items_seen: u32,
    pub duplicates_skipped: u32,
    pub out_of_range: u32,
    pub filtered: u32,
    pub accepted: u32,
    pub failed: u32,
    pub records_emitted: u32,
    pub warnings: Vec<CollectionWarning>,
}

impl ScrapeStats {
    pub fn progress(&self) -> ScrapeProgress {
        ScrapeProgress {
            batches: self.batches,
            items_seen: self.items_seen,
            items_accepted: self.accepted,
            records_emitted: self.records_emitted,
        }
    }
}

impl std::fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scrape Run Complete ===")?;
        writeln!(f, "Batches read:       {}", self.batches)?;
        writeln!(f, "Items seen:         {}", self.items_seen)?;
        writeln!(f, "Duplicates skipped: {}", self.duplicates_skipped)?;
        writeln!(f, "Out of range:       {}", self.out_of_range)?;
        writeln!(f, "Filtered:           {}", self.filtered)?;
        writeln!(f, "Accepted:           {}", self.accepted)?;
        writeln!(f, "Failed:             {}", self.failed)?;
        writeln!(f, "Records emitted:    {}", self.records_emitted)?;
        if !self.warnings.is_empty() {
            writeln!(f, "\nPartial comment collection:")?;
            for w in &self.warnings {
                writeln!(f, "  {} ({:?} after {} steps)", w.item, w.end, w.steps)?;
            }
        }
        Ok(())
    }
}

/// Result of a run that did not fail.
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub reason: StopReason,
    pub stats: ScrapeStats,
}
