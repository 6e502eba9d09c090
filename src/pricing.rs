//! Price computation. Pure: the same policy, base price, and booking kind
//! always produce the same quote, so the amount charged can be recomputed
//! and compared against what was shown to the learner.
//!
//! Discount order is fixed and must not change:
//! 1. group discount on the per-participant price (round half-up),
//! 2. recurring discount on the summed package total (round half-up),
//! 3. one flat platform fee per transaction.
//! The two discounts are never compounded beyond that.

use serde::{Deserialize, Serialize};

use crate::model::BookingKind;
use crate::policy::BookingPolicy;

/// The authoritative price breakdown for one booking transaction.
/// All amounts are minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub per_occurrence_base_cents: i64,
    /// Per participant, per occurrence, after any group discount.
    pub per_participant_cents: i64,
    /// What this learner pays for all occurrences, before the fee.
    pub package_total_cents: i64,
    pub platform_fee_cents: i64,
    pub grand_total_cents: i64,
    pub group_discount_bps: u32,
    pub recurring_discount_bps: u32,
}

/// Apply a basis-point discount, rounding half-up.
fn discounted(amount_cents: i64, discount_bps: u32) -> i64 {
    debug_assert!(discount_bps <= 10_000);
    let keep = i64::from(10_000 - discount_bps);
    (amount_cents * keep + 5_000) / 10_000
}

/// Basis-point share of an amount, rounding half-up. Refund math uses this.
pub(crate) fn portion(amount_cents: i64, bps: u32) -> i64 {
    debug_assert!(bps <= 10_000);
    (amount_cents * i64::from(bps) + 5_000) / 10_000
}

/// Compute the quote for one transaction: what one participant pays for
/// the whole request (a single occurrence, or every occurrence of a
/// recurring package, charged together).
pub fn quote(policy: &BookingPolicy, base_price_cents: i64, kind: BookingKind) -> Quote {
    let group_bps = if kind.group_size().is_some() {
        policy.group_discount_bps
    } else {
        0
    };
    let per_participant = discounted(base_price_cents, group_bps);

    let (recurring_bps, package_total) = match kind.recurrence() {
        Some((_, count)) => {
            let total = discounted(per_participant * i64::from(count), policy.recurring_discount_bps);
            (policy.recurring_discount_bps, total)
        }
        None => (0, per_participant),
    };

    Quote {
        per_occurrence_base_cents: base_price_cents,
        per_participant_cents: per_participant,
        package_total_cents: package_total,
        platform_fee_cents: policy.platform_fee_cents,
        grand_total_cents: package_total + policy.platform_fee_cents,
        group_discount_bps: group_bps,
        recurring_discount_bps: recurring_bps,
    }
}
