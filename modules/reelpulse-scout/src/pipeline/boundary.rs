//! Date-boundary gate applied to every feed item before any detail fetch.
//!
//! The feed is reverse-chronological, so once an item older than the window
//! start turns up past the first batch nothing further down can be in range.
//! The first batch is exempt: profiles pin old posts to the top.

use reelpulse_common::{FeedItem, ScrapeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    SkipOutOfRange,
    Halt,
}

pub fn evaluate(item: &FeedItem, window: &ScrapeWindow, is_first_batch: bool) -> Verdict {
    let Some(ts) = item.timestamp.as_ref() else {
        return Verdict::SkipOutOfRange;
    };

    if window.contains(ts) {
        Verdict::Accept
    } else if window.local_date(ts) < window.start() {
        if is_first_batch {
            Verdict::SkipOutOfRange
        } else {
            Verdict::Halt
        }
    } else {
        // No forward halt: the top of the feed is not guaranteed sorted.
        Verdict::SkipOutOfRange
    }
}
