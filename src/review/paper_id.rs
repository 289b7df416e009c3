//! Paper id allocation.
//!
//! A paper id is `YYMM` from the submission month followed by a global serial,
//! zero padded to three digits (`2501011`). The serial never resets per month:
//! it continues from the largest serial already in use. The scan and the insert
//! are not atomic, so callers retry on `StoreError::DuplicatePaperId`.

use chrono::{DateTime, Datelike, Utc};
use tracing::warn;

use crate::db::{Store, StoreError};

/// Attempts intake makes before giving up on a unique id.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 6;

pub fn format_paper_id(now: DateTime<Utc>, serial: u32) -> String {
    format!("{:02}{:02}{:03}", now.year().rem_euclid(100), now.month(), serial)
}

/// Numeric suffix of a paper id (everything after the `YYMM` prefix).
/// `PgStore` does the same parse in SQL.
#[cfg(test)]
pub fn paper_serial(paper_id: &str) -> Option<u32> {
    let suffix = paper_id.get(4..)?;
    if suffix.is_empty() || !paper_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// First serial to try for a new submission.
///
/// Falls back to `count + 1` when the max scan fails. That can hand out a
/// serial below the current maximum; the duplicate retry in intake covers it.
pub async fn next_serial(store: &dyn Store) -> Result<u32, StoreError> {
    match store.find_max_paper_serial().await {
        Ok(max) => Ok(max.unwrap_or(0).saturating_add(1)),
        Err(err) => {
            warn!(error = %err, "Paper serial scan failed, falling back to count");
            let count = store.count_submissions_with_paper_id().await?;
            Ok(u32::try_from(count).unwrap_or(u32::MAX).saturating_add(1))
        }
    }
}
