//! Payment gateway boundary. The engine only knows the charge/refund
//! contract; Stripe-shaped integrations live outside.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    Declined { reason: String },
    Timeout,
    Unavailable { message: String },
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Declined { reason } => write!(f, "declined: {reason}"),
            GatewayError::Timeout => write!(f, "gateway timeout"),
            GatewayError::Unavailable { message } => write!(f, "gateway unavailable: {message}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Successful charge: the gateway's own reference, needed for refunds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRef(pub String);

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount_cents`. Exactly one charge per booking transaction.
    async fn charge(
        &self,
        amount_cents: i64,
        currency: &str,
        payment_method_ref: &str,
    ) -> Result<GatewayRef, GatewayError>;

    /// Refund part or all of a captured charge.
    async fn refund(&self, gateway_ref: &GatewayRef, amount_cents: i64)
        -> Result<(), GatewayError>;
}

/// Test/development gateway. Succeeds by default; can be told to decline
/// every charge or to stall longer than the engine's payment timeout.
pub struct MockGateway {
    decline: std::sync::atomic::AtomicBool,
    delay_ms: std::sync::atomic::AtomicU64,
    charges: std::sync::atomic::AtomicU64,
    refunds: std::sync::atomic::AtomicU64,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            decline: std::sync::atomic::AtomicBool::new(false),
            delay_ms: std::sync::atomic::AtomicU64::new(0),
            charges: std::sync::atomic::AtomicU64::new(0),
            refunds: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn set_decline(&self, decline: bool) {
        self.decline.store(decline, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn charge_count(&self) -> u64 {
        self.charges.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn refund_count(&self) -> u64 {
        self.refunds.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(
        &self,
        amount_cents: i64,
        currency: &str,
        _payment_method_ref: &str,
    ) -> Result<GatewayRef, GatewayError> {
        let delay = self.delay_ms.load(std::sync::atomic::Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.decline.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(GatewayError::Declined { reason: "card declined".into() });
        }
        let n = self.charges.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tracing::debug!(amount_cents, currency, "mock charge captured");
        Ok(GatewayRef(format!("mock_txn_{n}")))
    }

    async fn refund(
        &self,
        gateway_ref: &GatewayRef,
        amount_cents: i64,
    ) -> Result<(), GatewayError> {
        self.refunds.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tracing::debug!(gateway_ref = %gateway_ref.0, amount_cents, "mock refund issued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_charge_and_refund() {
        let gw = MockGateway::new();
        let r = gw.charge(5_000, "USD", "pm_test").await.unwrap();
        assert!(r.0.starts_with("mock_txn_"));
        gw.refund(&r, 5_000).await.unwrap();
        assert_eq!(gw.charge_count(), 1);
        assert_eq!(gw.refund_count(), 1);
    }

    #[tokio::test]
    async fn mock_decline() {
        let gw = MockGateway::new();
        gw.set_decline(true);
        let r = gw.charge(5_000, "USD", "pm_test").await;
        assert!(matches!(r, Err(GatewayError::Declined { .. })));
        assert_eq!(gw.charge_count(), 0);
    }
}
