//! Hard caps protecting the engine from degenerate input.

use crate::model::Ms;

/// Occurrences a single recurring request may expand to.
pub const MAX_PACKAGE_OCCURRENCES: u32 = 52;

/// Upper bound on any session type's group capacity.
pub const MAX_GROUP_CAPACITY: u32 = 100;

/// Widest availability query window: 90 days.
pub const MAX_QUERY_WINDOW_MS: Ms = 90 * 24 * 3_600_000;

/// Intervals (occurrences) a single calendar may accumulate.
pub const MAX_OCCURRENCES_PER_CALENDAR: usize = 100_000;

/// Free-text notes length.
pub const MAX_NOTES_LEN: usize = 2_000;

/// Longest single occurrence: 24 hours.
pub const MAX_OCCURRENCE_DURATION_MS: Ms = 24 * 3_600_000;

/// Timestamps must land in [2000-01-01, 2100-01-01) to catch unit mixups
/// (seconds vs millis).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
