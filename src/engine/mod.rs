mod availability;
mod conflict;
mod error;
mod group;
mod lifecycle;
mod queries;
mod reserve;

pub use availability::{materialize_rules, merge_overlapping, open_windows, subtract_intervals};
pub use error::BookingError;
pub use group::JoinResult;
pub use lifecycle::ActorRole;

use std::sync::Arc;

use chrono_tz::Tz;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, RwLock};
use ulid::Ulid;

use crate::gateway::PaymentGateway;
use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::policy::BookingPolicy;
use crate::pricing::Quote;
use crate::store::{BookingStore, SharedCalendar};

/// What `create_booking` hands back to the caller. The client renders this
/// verbatim; it never computes prices or outcomes on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingResult {
    pub occurrence_ids: Vec<OccurrenceId>,
    pub package_id: Option<PackageId>,
    pub payment_id: PaymentId,
    pub pricing: Quote,
    pub status: OccurrenceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationResult {
    pub cancelled_occurrence_ids: Vec<OccurrenceId>,
    pub refund_cents: i64,
}

/// One idempotency-key slot: the first attempt's result cell plus when the
/// key was first seen, so stale keys can be swept.
pub(crate) struct IdempotencyEntry {
    pub(crate) cell: Arc<OnceCell<BookingResult>>,
    pub(crate) inserted_at: Ms,
}

/// The booking engine. One instance serves every mentor; each mentor's
/// calendar sits behind its own `RwLock` in the store, so requests for
/// different mentors never contend.
pub struct Engine {
    pub(crate) store: BookingStore,
    pub(crate) notify: Arc<NotifyHub>,
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) policy: BookingPolicy,
    /// Caller-supplied idempotency keys → first attempt's result. An
    /// in-flight attempt parks duplicate callers on the same cell; settled
    /// keys age out via the reaper.
    pub(crate) idempotency: DashMap<String, IdempotencyEntry>,
}

impl Engine {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        notify: Arc<NotifyHub>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store: BookingStore::new(),
            notify,
            gateway,
            policy,
            idempotency: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.notify
    }

    // ── Mentor/catalog administration ────────────────────────

    pub fn register_mentor(&self, mentor_id: MentorId, timezone: Tz) -> Result<(), BookingError> {
        if self.store.contains_calendar(&mentor_id) {
            return Err(BookingError::Validation("mentor already registered"));
        }
        let calendar = MentorCalendar::new(mentor_id, timezone);
        self.store
            .insert_calendar(mentor_id, Arc::new(RwLock::new(calendar)));
        Ok(())
    }

    pub fn register_session_type(&self, st: SessionType) -> Result<(), BookingError> {
        if st.duration_minutes == 0 {
            return Err(BookingError::Validation("session duration must be positive"));
        }
        if st.base_price_cents < 0 {
            return Err(BookingError::Validation("base price must not be negative"));
        }
        if st.supports_group && !(2..=MAX_GROUP_CAPACITY).contains(&st.max_group_capacity) {
            return Err(BookingError::Validation("group capacity out of range"));
        }
        if !self.store.contains_calendar(&st.mentor_id) {
            return Err(BookingError::NotFound(st.mentor_id));
        }
        self.store.insert_session_type(st);
        Ok(())
    }

    pub async fn add_availability_rule(
        &self,
        mentor_id: MentorId,
        rule: AvailabilityRule,
    ) -> Result<(), BookingError> {
        if rule.start_minute >= rule.end_minute || rule.end_minute > 1_440 {
            return Err(BookingError::Validation("rule minutes out of range"));
        }
        let cal = self.calendar(&mentor_id)?;
        let mut guard = cal.write().await;
        guard.rules.push(rule);
        Ok(())
    }

    pub async fn remove_availability_rule(
        &self,
        mentor_id: MentorId,
        rule_id: Ulid,
    ) -> Result<(), BookingError> {
        let cal = self.calendar(&mentor_id)?;
        let mut guard = cal.write().await;
        let before = guard.rules.len();
        guard.rules.retain(|r| r.id != rule_id);
        if guard.rules.len() == before {
            return Err(BookingError::NotFound(rule_id));
        }
        Ok(())
    }

    /// Block out a concrete period (vacation, sickness). Existing
    /// reservations are untouched; only future admission is affected.
    pub async fn add_blackout(
        &self,
        mentor_id: MentorId,
        blackout: Span,
    ) -> Result<(), BookingError> {
        conflict::validate_span(&blackout)?;
        let cal = self.calendar(&mentor_id)?;
        let mut guard = cal.write().await;
        guard.blackouts.push(blackout);
        guard.blackouts.sort_by_key(|s| s.start);
        Ok(())
    }

    // ── Shared internals ─────────────────────────────────────

    pub(crate) fn calendar(&self, mentor_id: &MentorId) -> Result<SharedCalendar, BookingError> {
        self.store
            .calendar(mentor_id)
            .ok_or(BookingError::NotFound(*mentor_id))
    }

    /// Lookup occurrence → mentor, then take the calendar write lock.
    pub(crate) async fn resolve_occurrence_write(
        &self,
        occurrence_id: &OccurrenceId,
    ) -> Result<(MentorId, tokio::sync::OwnedRwLockWriteGuard<MentorCalendar>), BookingError> {
        let mentor_id = self
            .store
            .mentor_for_occurrence(occurrence_id)
            .ok_or(BookingError::NotFound(*occurrence_id))?;
        let cal = self.calendar(&mentor_id)?;
        let guard = cal.write_owned().await;
        Ok((mentor_id, guard))
    }

    /// Expired pending holds across all calendars, for the reaper.
    /// `try_read` skips calendars currently being written; they get picked
    /// up on the next sweep.
    pub fn collect_expired_holds(&self, now: Ms) -> Vec<(OccurrenceId, MentorId)> {
        let mut expired = Vec::new();
        for mentor_id in self.store.mentor_ids() {
            let Some(cal) = self.store.calendar(&mentor_id) else {
                continue;
            };
            if let Ok(guard) = cal.try_read() {
                for occ in &guard.occurrences {
                    if let OccurrenceStatus::PendingPayment { hold_expires_at } = occ.status
                        && hold_expires_at <= now
                    {
                        expired.push((occ.id, mentor_id));
                    }
                }
            }
        }
        expired
    }

    /// Drop idempotency keys whose retention window passed. In-flight
    /// attempts (empty cells) are never dropped; duplicates must keep
    /// parking on them. Returns how many keys were removed.
    pub fn purge_stale_idempotency_keys(&self, now: Ms) -> usize {
        let before = self.idempotency.len();
        let retention = self.policy.idempotency_retention_ms;
        self.idempotency
            .retain(|_, e| e.cell.get().is_none() || now - e.inserted_at < retention);
        before - self.idempotency.len()
    }

    /// Cancel a pending occurrence whose hold lapsed, returning the slot
    /// to availability. No-op if payment won the race in the meantime.
    pub async fn release_expired_hold(
        &self,
        occurrence_id: OccurrenceId,
        now: Ms,
    ) -> Result<bool, BookingError> {
        let (mentor_id, mut guard) = self.resolve_occurrence_write(&occurrence_id).await?;
        let Some(occ) = guard.occurrence_mut(occurrence_id) else {
            return Err(BookingError::NotFound(occurrence_id));
        };
        match occ.status {
            OccurrenceStatus::PendingPayment { hold_expires_at } if hold_expires_at <= now => {
                occ.status = OccurrenceStatus::Cancelled;
                drop(guard);
                self.notify
                    .publish(mentor_id, &BookingEvent::HoldExpired { occurrence_id });
                metrics::counter!(crate::observability::HOLDS_REAPED_TOTAL).increment(1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
