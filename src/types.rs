//! Shared types used across the generation pipeline.
//!
//! Record identity and failure entries travel from the orchestrator
//! ([`crate::generate`]) to the CLI formatter ([`crate::output`]) and must
//! read the same in logs, progress lines and the final run summary.

use std::fmt;

/// Identity of one dataset row, used to attribute every per-record outcome.
///
/// `row` is the 1-based data row number (the header is not counted), so an
/// operator can jump straight to the offending line of the CSV.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub row: usize,
    pub city: String,
    pub state: String,
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} (row {})", self.city, self.state, self.row)
    }
}

/// A record that could not be turned into a page, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub record: RecordId,
    pub reason: String,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.record, self.reason)
    }
}
