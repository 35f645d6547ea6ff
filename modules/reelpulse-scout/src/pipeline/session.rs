use std::collections::HashSet;

use reelpulse_common::ItemRef;

/// Transient state of one scrape invocation. Discarded when the run ends;
/// a retry starts from a fresh session.
#[derive(Debug)]
pub struct ScrapeSession {
    account: String,
    cursor: u32,
    visited: HashSet<ItemRef>,
    /// The item that tripped the boundary, once one has.
    halted: Option<ItemRef>,
}

impl ScrapeSession {
    pub fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
            cursor: 0,
            visited: HashSet::new(),
            halted: None,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Index of the batch currently being processed.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn is_first_batch(&self) -> bool {
        self.cursor == 0
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Mark an item visited. Returns `false` if it already was.
    pub fn visit(&mut self, item: &ItemRef) -> bool {
        self.visited.insert(item.clone())
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn halt(&mut self, at: &ItemRef) {
        self.halted = Some(at.clone());
    }

    pub fn halted_at(&self) -> Option<&ItemRef> {
        self.halted.as_ref()
    }
}
