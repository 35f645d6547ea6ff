use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::ItemRef;

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Timeout or a field/element momentarily unavailable. Recovered locally.
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// Permanent network or protocol failure.
    #[error("Fatal transport error: {0}")]
    Fatal(String),

    #[error("Invalid window: start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScrapeError {
    /// Everything except a transient fetch error ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ScrapeError::Transient(_))
    }
}

/// Where in a run a fatal error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Open,
    BatchFetch,
    Advance,
    Detail,
    Comments,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Open => "open session",
            Stage::BatchFetch => "batch fetch",
            Stage::Advance => "advance",
            Stage::Detail => "detail fetch",
            Stage::Comments => "comment collection",
        };
        f.write_str(name)
    }
}

/// A fatal error with enough context to retry.
#[derive(Debug, Error)]
#[error("{stage} failed{}: {source}", describe_item(.item))]
pub struct ScrapeFailure {
    pub stage: Stage,
    pub item: Option<ItemRef>,
    #[source]
    pub source: ScrapeError,
}

impl ScrapeFailure {
    pub fn new(stage: Stage, source: ScrapeError) -> Self {
        Self {
            stage,
            item: None,
            source,
        }
    }

    pub fn at(stage: Stage, item: &ItemRef, source: ScrapeError) -> Self {
        Self {
            stage,
            item: Some(item.clone()),
            source,
        }
    }
}

fn describe_item(item: &Option<ItemRef>) -> String {
    match item {
        Some(item) => format!(" at {item}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_recoverable() {
        assert!(!ScrapeError::Transient("timeout".into()).is_fatal());
        assert!(ScrapeError::AuthenticationFailure("bad password".into()).is_fatal());
        assert!(ScrapeError::AccountNotFound("ghost".into()).is_fatal());
        assert!(ScrapeError::Fatal("connection refused".into()).is_fatal());
    }

    #[test]
    fn failure_message_names_stage_and_item() {
        let failure = ScrapeFailure::at(
            Stage::Detail,
            &ItemRef::new("https://www.instagram.com/reel/A/"),
            ScrapeError::Fatal("session closed".into()),
        );
        assert_eq!(
            failure.to_string(),
            "detail fetch failed at https://www.instagram.com/reel/A/: Fatal transport error: session closed"
        );

        let failure = ScrapeFailure::new(Stage::Open, ScrapeError::AccountNotFound("ghost".into()));
        assert_eq!(
            failure.to_string(),
            "open session failed: Account not found: ghost"
        );
    }
}
