//! Slot admission checks. Callers hold the calendar write lock; everything
//! here is synchronous and allocation-free on the happy path.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::limits::*;
use crate::model::{MentorCalendar, Ms, Span};

use super::error::BookingError;

pub(crate) fn now_ms() -> Ms {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Structural span checks shared by bookings, blackouts, and queries.
pub(crate) fn validate_span(span: &Span) -> Result<(), BookingError> {
    if span.start >= span.end {
        return Err(BookingError::Validation("span start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::Validation(
            "timestamp outside supported range (unit mixup?)",
        ));
    }
    if span.duration_ms() > MAX_OCCURRENCE_DURATION_MS {
        return Err(BookingError::LimitExceeded("occurrence duration"));
    }
    Ok(())
}

/// Admission check for a new reservation window: no active occurrence may
/// overlap it. Terminal occurrences and pending holds that already expired
/// do not block.
pub(crate) fn check_window_free(
    calendar: &MentorCalendar,
    window: &Span,
    now: Ms,
) -> Result<(), BookingError> {
    for occ in calendar.overlapping(window) {
        if occ.status.is_active(now) {
            return Err(BookingError::SlotConflict {
                occurrence_id: occ.id,
            });
        }
    }
    Ok(())
}
