//! Booking lifecycle transitions after confirmation: cancellation with
//! refunds, completion, no-show, and the few mutable fields a live
//! occurrence still has.
//!
//! Terminal states never transition again. A cancelled occurrence keeps its
//! record for audit but stops holding its slot the moment the status flips,
//! so no explicit "free the slot" step exists anywhere.

use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::observability;
use crate::pricing::portion;

use super::conflict::now_ms;
use super::error::BookingError;
use super::{CancellationResult, Engine};

/// Who asked for the transition. Mentors cancel penalty-free for the
/// learner; learners are subject to the notice policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Learner,
    Mentor,
}

impl ActorRole {
    fn label(&self) -> &'static str {
        match self {
            ActorRole::Learner => "learner",
            ActorRole::Mentor => "mentor",
        }
    }
}

impl Engine {
    /// Cancel one occurrence. Pending holds cancel for free (nothing was
    /// captured); confirmed occurrences refund every covering payment's
    /// share according to the notice policy.
    pub async fn cancel_occurrence(
        &self,
        occurrence_id: OccurrenceId,
        actor: ActorRole,
    ) -> Result<CancellationResult, BookingError> {
        let now = now_ms();
        let (mentor_id, mut guard) = self.resolve_occurrence_write(&occurrence_id).await?;
        let occ = guard
            .occurrence_mut(occurrence_id)
            .ok_or(BookingError::NotFound(occurrence_id))?;

        let was_confirmed = match occ.status {
            OccurrenceStatus::PendingPayment { .. } => false,
            OccurrenceStatus::Confirmed => {
                if actor == ActorRole::Learner && occ.span.start <= now {
                    return Err(BookingError::Validation("session already started"));
                }
                true
            }
            status => {
                return Err(BookingError::InvalidTransition {
                    from: status.label(),
                    to: "cancelled",
                });
            }
        };
        occ.status = OccurrenceStatus::Cancelled;
        let start = occ.span.start;
        drop(guard);

        let mut refund_total = 0;
        if was_confirmed {
            for payment in self.store.payments_for_occurrence(&occurrence_id) {
                // A package payment covers several occurrences; only this
                // one's share comes back.
                let share_count = payment.occurrence_ids.len();
                refund_total += self
                    .refund_payment_share(&payment, share_count, start, now, actor)
                    .await;
            }
        }

        self.notify.publish(
            mentor_id,
            &BookingEvent::BookingCancelled { occurrence_id, refund_cents: refund_total },
        );
        metrics::counter!(observability::CANCELLATIONS_TOTAL, "actor" => actor.label())
            .increment(1);
        tracing::info!(%occurrence_id, actor = actor.label(), refund_total, "booking cancelled");

        Ok(CancellationResult {
            cancelled_occurrence_ids: vec![occurrence_id],
            refund_cents: refund_total,
        })
    }

    /// Cancel every remaining occurrence of a recurring package. Already
    /// completed or cancelled occurrences are untouched; the refund covers
    /// only the cancelled ones' shares of the package payment.
    pub async fn cancel_package(
        &self,
        package_id: PackageId,
        actor: ActorRole,
    ) -> Result<CancellationResult, BookingError> {
        let now = now_ms();
        let package = self
            .store
            .package(&package_id)
            .ok_or(BookingError::NotFound(package_id))?;
        let cal = self.calendar(&package.mentor_id)?;

        let mut cancelled = Vec::new();
        let mut refundable: Vec<(OccurrenceId, Ms)> = Vec::new();
        {
            let mut guard = cal.write().await;
            for id in &package.occurrence_ids {
                let Some(occ) = guard.occurrence_mut(*id) else { continue };
                match occ.status {
                    OccurrenceStatus::PendingPayment { .. } => {
                        occ.status = OccurrenceStatus::Cancelled;
                        cancelled.push(*id);
                    }
                    OccurrenceStatus::Confirmed => {
                        if actor == ActorRole::Learner && occ.span.start <= now {
                            continue; // in-flight session stays on the books
                        }
                        occ.status = OccurrenceStatus::Cancelled;
                        cancelled.push(*id);
                        refundable.push((*id, occ.span.start));
                    }
                    _ => {}
                }
            }
        }
        if cancelled.is_empty() {
            return Err(BookingError::InvalidTransition {
                from: "terminal",
                to: "cancelled",
            });
        }

        let mut refund_total = 0;
        for (id, start) in &refundable {
            // Re-fetched each round so refunded_cents accumulates correctly.
            if let Some(payment) = self.store.payment_for_occurrence(id) {
                let share_count = payment.occurrence_ids.len();
                refund_total +=
                    self.refund_payment_share(&payment, share_count, *start, now, actor).await;
            }
        }

        for id in &cancelled {
            self.notify.publish(
                package.mentor_id,
                &BookingEvent::BookingCancelled { occurrence_id: *id, refund_cents: 0 },
            );
        }
        metrics::counter!(observability::CANCELLATIONS_TOTAL, "actor" => actor.label())
            .increment(cancelled.len() as u64);
        tracing::info!(%package_id, cancelled = cancelled.len(), refund_total, "package cancelled");

        Ok(CancellationResult { cancelled_occurrence_ids: cancelled, refund_cents: refund_total })
    }

    /// A participant gives up their seat in a group session. The seat
    /// reopens immediately; their payment refunds per the notice policy.
    pub async fn leave_group(
        &self,
        occurrence_id: OccurrenceId,
        learner_id: LearnerId,
    ) -> Result<CancellationResult, BookingError> {
        let now = now_ms();
        let (mentor_id, mut guard) = self.resolve_occurrence_write(&occurrence_id).await?;
        let occ = guard
            .occurrence_mut(occurrence_id)
            .ok_or(BookingError::NotFound(occurrence_id))?;
        if !occ.is_group() {
            return Err(BookingError::Validation("not a group session"));
        }
        if occ.status != OccurrenceStatus::Confirmed {
            return Err(BookingError::InvalidTransition {
                from: occ.status.label(),
                to: "left",
            });
        }
        if occ.span.start <= now {
            return Err(BookingError::Validation("session already started"));
        }
        let before = occ.participants.len();
        occ.participants.retain(|p| *p != learner_id);
        if occ.participants.len() == before {
            return Err(BookingError::NotFound(learner_id));
        }
        let start = occ.span.start;
        let remaining_seats = occ.remaining_seats();
        drop(guard);

        let mut refund_total = 0;
        for payment in self.store.payments_for_occurrence(&occurrence_id) {
            if payment.learner_id == learner_id {
                let share_count = payment.occurrence_ids.len();
                refund_total += self
                    .refund_payment_share(&payment, share_count, start, now, ActorRole::Learner)
                    .await;
            }
        }
        self.notify.publish(
            mentor_id,
            &BookingEvent::ParticipantLeft { occurrence_id, learner_id, remaining_seats },
        );
        metrics::counter!(observability::CANCELLATIONS_TOTAL, "actor" => "learner").increment(1);

        Ok(CancellationResult { cancelled_occurrence_ids: vec![], refund_cents: refund_total })
    }

    /// Mark a confirmed occurrence completed. Only allowed once its end
    /// time has passed.
    pub async fn complete_occurrence(
        &self,
        occurrence_id: OccurrenceId,
    ) -> Result<(), BookingError> {
        self.finish_occurrence(occurrence_id, OccurrenceStatus::Completed).await
    }

    /// Record that the learner did not show up. No refund. Only allowed
    /// once the occurrence has ended.
    pub async fn mark_no_show(&self, occurrence_id: OccurrenceId) -> Result<(), BookingError> {
        self.finish_occurrence(occurrence_id, OccurrenceStatus::NoShow).await
    }

    async fn finish_occurrence(
        &self,
        occurrence_id: OccurrenceId,
        target: OccurrenceStatus,
    ) -> Result<(), BookingError> {
        let now = now_ms();
        let (mentor_id, mut guard) = self.resolve_occurrence_write(&occurrence_id).await?;
        let occ = guard
            .occurrence_mut(occurrence_id)
            .ok_or(BookingError::NotFound(occurrence_id))?;
        if occ.status != OccurrenceStatus::Confirmed {
            return Err(BookingError::InvalidTransition {
                from: occ.status.label(),
                to: target.label(),
            });
        }
        if occ.span.end > now {
            return Err(BookingError::Validation("session has not ended yet"));
        }
        occ.status = target;
        drop(guard);

        let event = match target {
            OccurrenceStatus::NoShow => BookingEvent::NoShowRecorded { occurrence_id },
            _ => BookingEvent::BookingCompleted { occurrence_id },
        };
        self.notify.publish(mentor_id, &event);
        Ok(())
    }

    /// Attach or replace the meeting link on a confirmed occurrence.
    pub async fn attach_meeting_link(
        &self,
        occurrence_id: OccurrenceId,
        link: String,
    ) -> Result<(), BookingError> {
        let (_, mut guard) = self.resolve_occurrence_write(&occurrence_id).await?;
        let occ = guard
            .occurrence_mut(occurrence_id)
            .ok_or(BookingError::NotFound(occurrence_id))?;
        if occ.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                from: occ.status.label(),
                to: "meeting_link",
            });
        }
        occ.meeting_link = Some(link);
        Ok(())
    }

    /// Refund one occurrence's share of a captured payment. `share_count`
    /// is how many occurrences the payment covered; the platform fee is
    /// never refunded. Returns the amount actually refunded.
    async fn refund_payment_share(
        &self,
        payment: &Payment,
        share_count: usize,
        start: Ms,
        now: Ms,
        actor: ActorRole,
    ) -> i64 {
        if payment.status != PaymentStatus::Captured && payment.status != PaymentStatus::Refunded {
            return 0;
        }
        let refundable = payment.amount_cents - payment.platform_fee_cents;
        let share = refundable / share_count.max(1) as i64;
        let amount = match actor {
            ActorRole::Mentor => share,
            ActorRole::Learner => {
                if start - now >= self.policy.full_refund_notice_ms {
                    share
                } else {
                    portion(share, self.policy.partial_refund_bps)
                }
            }
        };
        let amount = amount.min(refundable - payment.refunded_cents);
        if amount <= 0 {
            return 0;
        }
        let Some(gateway_ref) = payment.gateway_ref.clone() else {
            return 0;
        };
        if let Err(err) = self
            .gateway
            .refund(&crate::gateway::GatewayRef(gateway_ref), amount)
            .await
        {
            tracing::warn!(payment = %payment.id, %err, "gateway refund failed");
            return 0;
        }

        let mut updated = payment.clone();
        updated.refunded_cents += amount;
        if updated.refunded_cents >= updated.amount_cents - updated.platform_fee_cents {
            updated.status = PaymentStatus::Refunded;
        }
        self.store.update_payment(updated);

        self.notify.publish(
            payment
                .occurrence_ids
                .first()
                .and_then(|id| self.store.mentor_for_occurrence(id))
                .unwrap_or_default(),
            &BookingEvent::RefundIssued { payment_id: payment.id, amount_cents: amount },
        );
        amount
    }
}
