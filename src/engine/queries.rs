//! Read-only queries. Each takes the calendar read lock for a consistent
//! snapshot; nothing here mutates.

use crate::limits::*;
use crate::model::*;

use super::availability::open_windows;
use super::conflict::{now_ms, validate_span};
use super::error::BookingError;
use super::Engine;

impl Engine {
    /// Free bookable windows for a mentor over `query`. With a duration,
    /// windows too short to host one session are dropped, and an empty
    /// result becomes an error so callers cannot mistake it for "free all
    /// day".
    pub async fn availability(
        &self,
        mentor_id: MentorId,
        query: Span,
        min_duration_minutes: Option<u32>,
    ) -> Result<Vec<Span>, BookingError> {
        if query.start >= query.end {
            return Err(BookingError::Validation("query start must be before end"));
        }
        if query.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(BookingError::LimitExceeded("query window"));
        }
        let now = now_ms();
        let cal = self.calendar(&mentor_id)?;
        let guard = cal.read().await;
        let mut windows = open_windows(&guard, &query, now);
        drop(guard);

        if let Some(minutes) = min_duration_minutes {
            let need = Ms::from(minutes) * 60_000;
            windows.retain(|w| w.duration_ms() >= need);
            if windows.is_empty() {
                return Err(BookingError::NoAvailability { start: query.start, end: query.end });
            }
        }
        Ok(windows)
    }

    pub async fn get_occurrence(
        &self,
        occurrence_id: OccurrenceId,
    ) -> Result<Occurrence, BookingError> {
        let mentor_id = self
            .store
            .mentor_for_occurrence(&occurrence_id)
            .ok_or(BookingError::NotFound(occurrence_id))?;
        let cal = self.calendar(&mentor_id)?;
        let guard = cal.read().await;
        guard
            .occurrence(occurrence_id)
            .cloned()
            .ok_or(BookingError::NotFound(occurrence_id))
    }

    pub fn get_package(&self, package_id: PackageId) -> Result<RecurringPackage, BookingError> {
        self.store
            .package(&package_id)
            .ok_or(BookingError::NotFound(package_id))
    }

    pub fn get_payment(&self, payment_id: PaymentId) -> Result<Payment, BookingError> {
        self.store
            .payment(&payment_id)
            .ok_or(BookingError::NotFound(payment_id))
    }

    /// Confirmed group sessions with open seats starting inside `query`.
    pub async fn open_group_sessions(
        &self,
        mentor_id: MentorId,
        query: Span,
    ) -> Result<Vec<Occurrence>, BookingError> {
        validate_span(&query).or(Err(BookingError::Validation("invalid query window")))?;
        let now = now_ms();
        let cal = self.calendar(&mentor_id)?;
        let guard = cal.read().await;
        Ok(guard
            .overlapping(&query)
            .filter(|o| {
                o.is_group()
                    && o.status == OccurrenceStatus::Confirmed
                    && o.remaining_seats() > 0
                    && o.span.start > now
            })
            .cloned()
            .collect())
    }

    /// A mentor's full schedule over `query`, terminal occurrences included.
    pub async fn mentor_schedule(
        &self,
        mentor_id: MentorId,
        query: Span,
    ) -> Result<Vec<Occurrence>, BookingError> {
        if query.start >= query.end {
            return Err(BookingError::Validation("query start must be before end"));
        }
        let cal = self.calendar(&mentor_id)?;
        let guard = cal.read().await;
        Ok(guard.overlapping(&query).cloned().collect())
    }
}
