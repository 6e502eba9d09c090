//! Reservation coordinator: the two-phase create-booking flow.
//!
//! Phase 1 takes the mentor's calendar write lock, admits every candidate
//! occurrence (all-or-nothing), and inserts them as `pending_payment` holds.
//! The lock is released before the gateway is called. Phase 2 re-locks and
//! either confirms every hold or removes every one of them. Concurrent
//! requests for the same window therefore race on phase 1 only, and at most
//! one of them can win.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use ulid::Ulid;

use crate::gateway::GatewayRef;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::pricing;
use crate::recurrence;
use crate::store::SharedCalendar;

use super::availability::within_open_hours;
use super::conflict::{check_window_free, now_ms, validate_span};
use super::error::BookingError;
use super::{BookingResult, Engine};

fn kind_label(kind: &BookingKind) -> &'static str {
    match kind {
        BookingKind::Plain => "plain",
        BookingKind::Group { .. } => "group",
        BookingKind::Recurring { .. } => "recurring",
        BookingKind::GroupRecurring { .. } => "group_recurring",
    }
}

impl Engine {
    /// Create a booking. With an idempotency key, a retried request returns
    /// the first attempt's result without re-reserving or re-charging; a
    /// failed attempt clears the key so the client may retry for real.
    pub async fn create_booking(
        &self,
        request: BookingRequest,
        idempotency_key: Option<&str>,
    ) -> Result<BookingResult, BookingError> {
        let Some(key) = idempotency_key else {
            return self.process_booking(request).await;
        };
        if key.is_empty() {
            return Err(BookingError::Validation("idempotency key must not be empty"));
        }

        let cell = self
            .idempotency
            .entry(key.to_string())
            .or_insert_with(|| super::IdempotencyEntry {
                cell: Arc::new(OnceCell::new()),
                inserted_at: now_ms(),
            })
            .cell
            .clone();

        let result = cell
            .get_or_try_init(|| self.process_booking(request))
            .await
            .cloned();
        if result.is_err() {
            // Only the losing attempt's key is dropped; a concurrent winner
            // has already initialized the cell and stays cached.
            self.idempotency
                .remove_if(key, |_, e| Arc::ptr_eq(&e.cell, &cell) && e.cell.get().is_none());
        }
        result
    }

    async fn process_booking(&self, request: BookingRequest) -> Result<BookingResult, BookingError> {
        let started = std::time::Instant::now();
        let kind = kind_label(&request.kind);

        let outcome = self.process_booking_inner(&request).await;

        let status = match &outcome {
            Ok(_) => "confirmed",
            Err(e) => match e {
                BookingError::PaymentFailed(_) => "payment_failed",
                BookingError::SlotConflict { .. }
                | BookingError::PartialRecurrenceConflict { .. } => "conflict",
                BookingError::NoAvailability { .. } => "no_availability",
                _ => "rejected",
            },
        };
        metrics::counter!(observability::BOOKINGS_TOTAL, "kind" => kind, "status" => status)
            .increment(1);
        metrics::histogram!(observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn process_booking_inner(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingResult, BookingError> {
        let now = now_ms();
        let session_type = self.validate_request(request, now)?;
        let cal = self.calendar(&request.mentor_id)?;

        // Phase 1: admit and hold under the calendar lock.
        let (occurrence_ids, package_id, quote) =
            self.reserve_pending(&cal, request, &session_type, now).await?;

        self.notify.publish(
            request.mentor_id,
            &BookingEvent::OccurrencesReserved {
                occurrence_ids: occurrence_ids.clone(),
                learner_id: request.learner_id,
            },
        );
        tracing::debug!(
            learner = %request.learner_id,
            mentor = %request.mentor_id,
            occurrences = occurrence_ids.len(),
            total_cents = quote.grand_total_cents,
            "holds placed, charging"
        );

        // Phase 2: charge without holding any lock, then settle.
        let charge = tokio::time::timeout(
            Duration::from_millis(self.policy.payment_timeout_ms as u64),
            self.gateway.charge(
                quote.grand_total_cents,
                &self.policy.currency,
                &request.payment_method_ref,
            ),
        )
        .await;

        match charge {
            Ok(Ok(gateway_ref)) => {
                self.confirm_reserved(&cal, request, occurrence_ids, package_id, quote, gateway_ref)
                    .await
            }
            Ok(Err(err)) => {
                metrics::counter!(observability::PAYMENT_FAILURES_TOTAL).increment(1);
                self.release_reserved(&cal, &occurrence_ids, package_id).await;
                Err(BookingError::PaymentFailed(err.to_string()))
            }
            Err(_) => {
                metrics::counter!(observability::PAYMENT_FAILURES_TOTAL).increment(1);
                self.release_reserved(&cal, &occurrence_ids, package_id).await;
                Err(BookingError::PaymentFailed("gateway timed out".into()))
            }
        }
    }

    /// Structural validation plus catalog lookups. No lock taken.
    fn validate_request(
        &self,
        request: &BookingRequest,
        now: Ms,
    ) -> Result<SessionType, BookingError> {
        if let Some(notes) = &request.notes
            && notes.len() > MAX_NOTES_LEN
        {
            return Err(BookingError::LimitExceeded("notes length"));
        }
        if request.payment_method_ref.is_empty() {
            return Err(BookingError::Validation("payment method required"));
        }
        if let Some((_, count)) = request.kind.recurrence() {
            if count < 2 {
                return Err(BookingError::Validation(
                    "recurring booking needs at least two occurrences",
                ));
            }
            if count > MAX_PACKAGE_OCCURRENCES {
                return Err(BookingError::LimitExceeded("package occurrence count"));
            }
        }

        let session_type = self
            .store
            .session_type(&request.session_type_id)
            .ok_or(BookingError::NotFound(request.session_type_id))?;
        if session_type.mentor_id != request.mentor_id {
            return Err(BookingError::Validation("session type belongs to another mentor"));
        }
        if let Some(size) = request.kind.group_size() {
            if !session_type.supports_group {
                return Err(BookingError::Validation("session type is not group-bookable"));
            }
            if size < 2 || size > session_type.max_group_capacity {
                return Err(BookingError::Validation("group size out of range"));
            }
        }

        // checked_sub: a degenerate anchor near i64::MIN must reject, not
        // overflow.
        let notice = request
            .anchor_start
            .checked_sub(now)
            .ok_or(BookingError::Validation("start time out of range"))?;
        if notice < self.policy.min_notice_ms {
            return Err(BookingError::Validation("booking starts too soon"));
        }
        if notice > self.policy.max_advance_ms {
            return Err(BookingError::Validation("booking starts too far out"));
        }
        Ok(session_type)
    }

    /// Phase 1. All candidate windows are checked before anything is
    /// inserted, so a failure here has nothing to undo.
    async fn reserve_pending(
        &self,
        cal: &SharedCalendar,
        request: &BookingRequest,
        session_type: &SessionType,
        now: Ms,
    ) -> Result<(Vec<OccurrenceId>, Option<PackageId>, pricing::Quote), BookingError> {
        let duration_ms = Ms::from(session_type.duration_minutes) * 60_000;
        let capacity = request.kind.group_size().unwrap_or(1);
        let recurring = request.kind.recurrence();

        let mut guard = cal.write().await;

        let starts = match recurring {
            Some((frequency, count)) => {
                let starts =
                    recurrence::expand(request.anchor_start, guard.timezone, frequency, count);
                if starts.len() != count as usize {
                    return Err(BookingError::Validation("recurrence expansion failed"));
                }
                starts
            }
            None => vec![request.anchor_start],
        };
        if guard.occurrences.len() + starts.len() > MAX_OCCURRENCES_PER_CALENDAR {
            return Err(BookingError::LimitExceeded("occurrences per calendar"));
        }

        let mut spans = Vec::with_capacity(starts.len());
        for (index, start) in starts.iter().enumerate() {
            let span = Span { start: *start, end: *start + duration_ms };
            validate_span(&span)?;
            if !within_open_hours(&guard, &span) {
                return Err(if recurring.is_some() {
                    BookingError::PartialRecurrenceConflict { index, start: span.start }
                } else {
                    BookingError::NoAvailability { start: span.start, end: span.end }
                });
            }
            if let Err(conflict) = check_window_free(&guard, &span, now) {
                return Err(if recurring.is_some() {
                    BookingError::PartialRecurrenceConflict { index, start: span.start }
                } else {
                    conflict
                });
            }
            // Candidates are ordered; a long session can still run into the
            // next step's window.
            if let Some(prev) = spans.last()
                && span.overlaps(prev)
            {
                return Err(BookingError::PartialRecurrenceConflict { index, start: span.start });
            }
            spans.push(span);
        }

        let quote = pricing::quote(&self.policy, session_type.base_price_cents, request.kind);
        let package_id = recurring.map(|_| Ulid::new());
        let hold_expires_at = now + self.policy.hold_duration_ms;

        let mut occurrence_ids = Vec::with_capacity(spans.len());
        for span in spans {
            let id = Ulid::new();
            guard.insert_occurrence(Occurrence {
                id,
                mentor_id: request.mentor_id,
                session_type_id: session_type.id,
                span,
                capacity,
                participants: vec![request.learner_id],
                status: OccurrenceStatus::PendingPayment { hold_expires_at },
                price_per_participant_cents: quote.per_participant_cents,
                package_id,
                meeting_link: None,
            });
            self.store.index_occurrence(id, request.mentor_id);
            occurrence_ids.push(id);
        }
        drop(guard);

        if let (Some(id), Some((frequency, count))) = (package_id, recurring) {
            self.store.insert_package(RecurringPackage {
                id,
                learner_id: request.learner_id,
                mentor_id: request.mentor_id,
                occurrence_ids: occurrence_ids.clone(),
                frequency,
                count,
                discount_bps: quote.recurring_discount_bps,
            });
        }
        Ok((occurrence_ids, package_id, quote))
    }

    /// Phase 2, success path. If the reaper got to any hold first the
    /// charge is returned in full and the attempt fails.
    async fn confirm_reserved(
        &self,
        cal: &SharedCalendar,
        request: &BookingRequest,
        occurrence_ids: Vec<OccurrenceId>,
        package_id: Option<PackageId>,
        quote: pricing::Quote,
        gateway_ref: GatewayRef,
    ) -> Result<BookingResult, BookingError> {
        let mut guard = cal.write().await;
        // A hold whose deadline passed mid-charge no longer owns the slot:
        // a competing booking may already sit on top of it. Such a capture
        // is refunded, never confirmed.
        let now = now_ms();
        let lapsed = occurrence_ids.iter().any(|id| {
            !matches!(
                guard.occurrence(*id).map(|o| o.status),
                Some(OccurrenceStatus::PendingPayment { hold_expires_at }) if hold_expires_at > now
            )
        });
        if lapsed {
            drop(guard);
            self.release_reserved(cal, &occurrence_ids, package_id).await;
            if let Err(err) = self.gateway.refund(&gateway_ref, quote.grand_total_cents).await {
                tracing::warn!(%err, "refund after lapsed hold failed");
            }
            return Err(BookingError::PaymentFailed(
                "hold lapsed before capture; charge refunded".into(),
            ));
        }
        let mut confirmed_spans = Vec::with_capacity(occurrence_ids.len());
        for id in &occurrence_ids {
            if let Some(occ) = guard.occurrence_mut(*id) {
                occ.status = OccurrenceStatus::Confirmed;
                confirmed_spans.push(occ.span);
            }
        }
        drop(guard);

        let payment = Payment {
            id: Ulid::new(),
            learner_id: request.learner_id,
            amount_cents: quote.grand_total_cents,
            platform_fee_cents: quote.platform_fee_cents,
            currency: self.policy.currency.clone(),
            gateway_ref: Some(gateway_ref.0),
            status: PaymentStatus::Captured,
            occurrence_ids: occurrence_ids.clone(),
            refunded_cents: 0,
        };
        let payment_id = payment.id;
        self.store.insert_payment(payment);

        for (id, span) in occurrence_ids.iter().zip(&confirmed_spans) {
            self.notify.publish(
                request.mentor_id,
                &BookingEvent::BookingConfirmed {
                    occurrence_id: *id,
                    learner_id: request.learner_id,
                    span: *span,
                },
            );
        }
        tracing::info!(
            learner = %request.learner_id,
            mentor = %request.mentor_id,
            occurrences = occurrence_ids.len(),
            total_cents = quote.grand_total_cents,
            "booking confirmed"
        );

        Ok(BookingResult {
            occurrence_ids,
            package_id,
            payment_id,
            pricing: quote,
            status: OccurrenceStatus::Confirmed,
        })
    }

    /// Undo phase 1 after a failed charge: holds are deleted outright, not
    /// cancelled, because the learner never owned them.
    async fn release_reserved(
        &self,
        cal: &SharedCalendar,
        occurrence_ids: &[OccurrenceId],
        package_id: Option<PackageId>,
    ) {
        let mut guard = cal.write().await;
        for id in occurrence_ids {
            guard.remove_occurrence(*id);
            self.store.unindex_occurrence(id);
        }
        drop(guard);
        if let Some(id) = package_id {
            self.store.remove_package(&id);
        }
    }
}
