//! Pending source URLs of one session.
//!
//! Owned by the session's coordinator task, which serializes every mutation,
//! so the queue itself carries no locking.

use std::collections::VecDeque;

#[derive(Debug, Default, Clone)]
pub struct PlaybackQueue {
    entries: VecDeque<String>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail, returns the 1-based position of the new entry
    pub fn enqueue(&mut self, url: impl Into<String>) -> usize {
        self.entries.push_back(url.into());
        self.entries.len()
    }

    pub fn peek_head(&self) -> Option<&str> {
        self.entries.front().map(String::as_str)
    }

    pub fn dequeue_head(&mut self) -> Option<String> {
        self.entries.pop_front()
    }

    /// Drop every entry, returns how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}
