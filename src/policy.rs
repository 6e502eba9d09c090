//! Policy values the engine treats as configuration, not code.
//!
//! Defaults match the product rules; deployments override via environment
//! variables (`MENTORBOOK_*`) the same way the rest of the runtime config
//! is wired.

use serde::Deserialize;

use crate::model::Ms;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BookingPolicy {
    /// Group discount applied to the per-participant price, basis points.
    pub group_discount_bps: u32,
    /// Recurring discount applied to the package total, basis points.
    pub recurring_discount_bps: u32,
    /// Flat platform fee per transaction, minor units.
    pub platform_fee_cents: i64,
    pub currency: String,
    /// How long a pending_payment occurrence holds its slot.
    pub hold_duration_ms: Ms,
    /// How long to wait for the payment gateway before releasing.
    pub payment_timeout_ms: Ms,
    /// Cancelling earlier than this before start refunds in full.
    pub full_refund_notice_ms: Ms,
    /// Refund share inside the notice window, basis points.
    pub partial_refund_bps: u32,
    /// Bookings must start at least this far in the future.
    pub min_notice_ms: Ms,
    /// Bookings cannot start further out than this.
    pub max_advance_ms: Ms,
    /// How long a settled idempotency key keeps returning its cached
    /// result before the reaper drops it.
    pub idempotency_retention_ms: Ms,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            group_discount_bps: 2_000,
            recurring_discount_bps: 1_000,
            platform_fee_cents: 250,
            currency: "USD".into(),
            hold_duration_ms: 10 * 60_000,
            payment_timeout_ms: 30_000,
            full_refund_notice_ms: 24 * 3_600_000,
            partial_refund_bps: 5_000,
            min_notice_ms: 2 * 3_600_000,
            max_advance_ms: 90 * 24 * 3_600_000,
            idempotency_retention_ms: 24 * 3_600_000,
        }
    }
}

impl BookingPolicy {
    /// Defaults overridden by `MENTORBOOK_*` environment variables.
    pub fn from_env() -> Self {
        let mut p = Self::default();
        if let Some(v) = env_parse("MENTORBOOK_GROUP_DISCOUNT_BPS") {
            p.group_discount_bps = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_RECURRING_DISCOUNT_BPS") {
            p.recurring_discount_bps = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_PLATFORM_FEE_CENTS") {
            p.platform_fee_cents = v;
        }
        if let Ok(v) = std::env::var("MENTORBOOK_CURRENCY") {
            p.currency = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_HOLD_DURATION_MS") {
            p.hold_duration_ms = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_PAYMENT_TIMEOUT_MS") {
            p.payment_timeout_ms = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_FULL_REFUND_NOTICE_MS") {
            p.full_refund_notice_ms = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_PARTIAL_REFUND_BPS") {
            p.partial_refund_bps = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_MIN_NOTICE_MS") {
            p.min_notice_ms = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_MAX_ADVANCE_MS") {
            p.max_advance_ms = v;
        }
        if let Some(v) = env_parse("MENTORBOOK_IDEMPOTENCY_RETENTION_MS") {
            p.idempotency_retention_ms = v;
        }
        p
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_product_rules() {
        let p = BookingPolicy::default();
        assert_eq!(p.group_discount_bps, 2_000);
        assert_eq!(p.recurring_discount_bps, 1_000);
        assert!(p.hold_duration_ms > 0);
        assert!(p.full_refund_notice_ms > p.min_notice_ms);
    }

    #[test]
    fn deserializes_partial_overrides() {
        let p: BookingPolicy =
            serde_json::from_str(r#"{"platform_fee_cents": 500, "currency": "EUR"}"#).unwrap();
        assert_eq!(p.platform_fee_cents, 500);
        assert_eq!(p.currency, "EUR");
        assert_eq!(p.group_discount_bps, 2_000); // default kept
    }
}
