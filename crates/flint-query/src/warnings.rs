//! Warning sink (§6): non-fatal conditions attached to an output table rather
//! than aborting the query.

use std::fmt;

/// Reason codes referenced by the core (§6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonType {
    /// A `LIMIT`/pagination clause produced fewer rows than were available.
    DataTruncated,
    /// A `FORMAT` pattern failed to compile; the column's format was skipped.
    IllegalFormattingPatterns,
    /// The splitter, or a collaborator, was asked for a capability it does
    /// not support.
    NotSupported,
    /// Emitted by an external signature-check collaborator, not by this
    /// engine — kept here only so callers routing warnings through this
    /// crate have one enum to match on.
    NotModified,
}

impl fmt::Display for ReasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonType::DataTruncated => "DATA_TRUNCATED",
            ReasonType::IllegalFormattingPatterns => "ILLEGAL_FORMATTING_PATTERNS",
            ReasonType::NotSupported => "NOT_SUPPORTED",
            ReasonType::NotModified => "NOT_MODIFIED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub reason: ReasonType,
    pub message: String,
}

impl Warning {
    pub fn new(reason: ReasonType, message: impl Into<String>) -> Self {
        Warning {
            reason,
            message: message.into(),
        }
    }
}
