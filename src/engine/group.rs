//! Group-session pool: seat admission for already-confirmed group
//! occurrences.
//!
//! The seat is taken tentatively under the calendar lock before the charge,
//! so two learners racing for the last seat cannot both pay. A failed
//! charge gives the seat back.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::conflict::now_ms;
use super::error::BookingError;
use super::Engine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResult {
    pub occurrence_id: OccurrenceId,
    pub payment_id: PaymentId,
    pub amount_cents: i64,
    pub remaining_seats: u32,
}

impl Engine {
    /// Join a confirmed group session. The price is the one fixed when the
    /// session was created; later policy changes do not apply.
    pub async fn join_group(
        &self,
        occurrence_id: OccurrenceId,
        learner_id: LearnerId,
        payment_method_ref: &str,
    ) -> Result<JoinResult, BookingError> {
        if payment_method_ref.is_empty() {
            return Err(BookingError::Validation("payment method required"));
        }
        let now = now_ms();

        let mentor_id;
        let price_cents;
        {
            let (mentor, mut guard) = self.resolve_occurrence_write(&occurrence_id).await?;
            mentor_id = mentor;
            let occ = guard
                .occurrence_mut(occurrence_id)
                .ok_or(BookingError::NotFound(occurrence_id))?;
            if !occ.is_group() {
                return Err(BookingError::Validation("not a group session"));
            }
            if occ.status != OccurrenceStatus::Confirmed {
                return Err(BookingError::Validation("group session not open for joining"));
            }
            if occ.span.start <= now {
                return Err(BookingError::JoinWindowClosed { occurrence_id });
            }
            if occ.participants.contains(&learner_id) {
                return Err(BookingError::Validation("learner already joined"));
            }
            if occ.remaining_seats() == 0 {
                return Err(BookingError::CapacityExceeded { capacity: occ.capacity });
            }
            occ.participants.push(learner_id);
            price_cents = occ.price_per_participant_cents;
        }

        let amount_cents = price_cents + self.policy.platform_fee_cents;
        let charge = tokio::time::timeout(
            Duration::from_millis(self.policy.payment_timeout_ms as u64),
            self.gateway
                .charge(amount_cents, &self.policy.currency, payment_method_ref),
        )
        .await;

        let gateway_ref = match charge {
            Ok(Ok(gateway_ref)) => gateway_ref,
            other => {
                metrics::counter!(observability::PAYMENT_FAILURES_TOTAL).increment(1);
                self.relinquish_seat(occurrence_id, learner_id).await;
                let reason = match other {
                    Ok(Err(err)) => err.to_string(),
                    _ => "gateway timed out".into(),
                };
                return Err(BookingError::PaymentFailed(reason));
            }
        };

        // The session may have been cancelled while the charge was in
        // flight; in that case the money goes straight back.
        let remaining_seats;
        {
            let (_, guard) = self.resolve_occurrence_write(&occurrence_id).await?;
            match guard.occurrence(occurrence_id) {
                Some(occ) if occ.status == OccurrenceStatus::Confirmed => {
                    remaining_seats = occ.remaining_seats();
                }
                _ => {
                    drop(guard);
                    if let Err(err) = self.gateway.refund(&gateway_ref, amount_cents).await {
                        tracing::warn!(%err, "refund after cancelled group session failed");
                    }
                    return Err(BookingError::PaymentFailed(
                        "session cancelled before capture; charge refunded".into(),
                    ));
                }
            }
        }

        let payment = Payment {
            id: Ulid::new(),
            learner_id,
            amount_cents,
            platform_fee_cents: self.policy.platform_fee_cents,
            currency: self.policy.currency.clone(),
            gateway_ref: Some(gateway_ref.0),
            status: PaymentStatus::Captured,
            occurrence_ids: vec![occurrence_id],
            refunded_cents: 0,
        };
        let payment_id = payment.id;
        self.store.insert_payment(payment);

        self.notify.publish(
            mentor_id,
            &BookingEvent::ParticipantJoined { occurrence_id, learner_id, remaining_seats },
        );
        metrics::counter!(observability::GROUP_JOINS_TOTAL).increment(1);
        tracing::debug!(%occurrence_id, %learner_id, remaining_seats, "participant joined");

        Ok(JoinResult { occurrence_id, payment_id, amount_cents, remaining_seats })
    }

    async fn relinquish_seat(&self, occurrence_id: OccurrenceId, learner_id: LearnerId) {
        if let Ok((_, mut guard)) = self.resolve_occurrence_write(&occurrence_id).await
            && let Some(occ) = guard.occurrence_mut(occurrence_id)
        {
            occ.participants.retain(|p| *p != learner_id);
        }
    }
}
