//! Run-level failure taxonomy.
//!
//! Per-record and per-page problems never surface here; they are absorbed by
//! the mapper, the filter, and the pagination error budget. These variants
//! cover the conditions that end a run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no usable market surface — open the trade page in a tab first")]
    NoSurface,

    #[error("halted by HTTP {status}")]
    Halted { status: u16 },

    #[error("gave up after {count} consecutive request failures")]
    ErrorBudgetExhausted { count: u32 },
}

/// Truncate a response body for diagnostics.
pub fn body_sample(body: &str) -> String {
    const MAX: usize = 160;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}
