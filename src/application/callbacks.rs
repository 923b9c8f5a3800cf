use crate::application::engine::{Reconciliation, ReconciliationEngine};
use crate::domain::notification::Gateway;
use crate::domain::ports::RawCallback;
use crate::error::{PaymentError, Result};
use crate::interfaces::gateway::{Acknowledgement, GatewayRegistry, acknowledge};
use std::sync::Arc;
use tracing::{error, warn};

/// Result of one inbound callback: what to answer and what happened.
#[derive(Debug)]
pub struct CallbackOutcome {
    pub acknowledgement: Acknowledgement,
    pub result: Result<Reconciliation>,
}

/// Verifies a raw callback with the gateway's adapter and reconciles it.
///
/// Never fails: every error is logged and turned into the gateway's failure
/// acknowledgement.
pub struct CallbackService {
    registry: GatewayRegistry,
    engine: Arc<ReconciliationEngine>,
}

impl CallbackService {
    pub fn new(registry: GatewayRegistry, engine: Arc<ReconciliationEngine>) -> Self {
        Self { registry, engine }
    }

    pub async fn handle(&self, gateway: Gateway, raw: RawCallback) -> CallbackOutcome {
        let result = self.process(gateway, &raw).await;
        if let Err(e) = &result {
            report(gateway, e);
        }
        CallbackOutcome {
            acknowledgement: acknowledge(gateway, result.is_ok()),
            result,
        }
    }

    async fn process(&self, gateway: Gateway, raw: &RawCallback) -> Result<Reconciliation> {
        let notification = self.registry.get(gateway)?.verify(raw)?;
        self.engine.apply(&notification).await
    }
}

fn report(gateway: Gateway, e: &PaymentError) {
    match e {
        PaymentError::ConflictingState { .. } | PaymentError::AmountMismatch { .. } => {
            error!(%gateway, error = %e, "callback disagrees with ledger")
        }
        e if e.is_permanent() => warn!(%gateway, error = %e, "callback rejected"),
        e => error!(%gateway, error = %e, "callback failed, gateway will retry"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::binder::EnrollmentBinder;
    use crate::application::locks::OrderLocks;
    use crate::domain::order::{Amount, Order, OrderNo, OrderStatus, PaymentMethod};
    use crate::domain::ports::OrderStore;
    use crate::error::VerificationError;
    use crate::infrastructure::in_memory::{InMemoryEnrollmentStore, InMemoryOrderStore};
    use crate::interfaces::gateway::{AlipayAdapter, Fields};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    const APP_ID: &str = "2021000000000001";
    const SECRET: &str = "alipay-secret";

    async fn service() -> (CallbackService, Arc<InMemoryOrderStore>) {
        let orders = Arc::new(InMemoryOrderStore::new());
        orders
            .insert(Order::new(
                OrderNo::new("PAY20250101000001").unwrap(),
                Amount::new(dec!(599.00)).unwrap(),
                PaymentMethod::AlipayQr,
                Utc::now(),
            ))
            .await
            .unwrap();
        let engine = Arc::new(ReconciliationEngine::new(
            orders.clone(),
            EnrollmentBinder::new(Arc::new(InMemoryEnrollmentStore::new())),
            OrderLocks::new(),
        ));
        let mut registry = GatewayRegistry::new();
        registry.register(Box::new(AlipayAdapter::new(APP_ID, SECRET)));
        (CallbackService::new(registry, engine), orders)
    }

    fn alipay_callback(order_no: &str, status: &str) -> RawCallback {
        let mut fields: Fields = [
            ("app_id", APP_ID),
            ("out_trade_no", order_no),
            ("trade_no", "TXN123"),
            ("trade_status", status),
            ("total_amount", "599.00"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let sign = AlipayAdapter::new(APP_ID, SECRET).sign(&fields);
        fields.insert("sign".to_string(), sign);
        RawCallback::new(None, serde_urlencoded::to_string(&fields).unwrap())
    }

    #[tokio::test]
    async fn test_applied_and_duplicate_are_acknowledged() {
        let (service, orders) = service().await;
        let raw = alipay_callback("PAY20250101000001", "TRADE_SUCCESS");

        let first = service.handle(Gateway::Alipay, raw.clone()).await;
        assert_eq!(first.acknowledgement.body, "success");
        assert!(matches!(first.result, Ok(Reconciliation::Applied { .. })));

        let second = service.handle(Gateway::Alipay, raw).await;
        assert_eq!(second.acknowledgement.body, "success");
        assert!(matches!(second.result, Ok(Reconciliation::Duplicate(_))));

        let order = orders
            .get(&OrderNo::new("PAY20250101000001").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_failures_get_failure_ack() {
        let (service, _) = service().await;

        let unknown = service
            .handle(Gateway::Alipay, alipay_callback("PAY404", "TRADE_SUCCESS"))
            .await;
        assert_eq!(unknown.acknowledgement.body, "fail");
        assert!(matches!(unknown.result, Err(PaymentError::OrderNotFound(_))));

        let unconfigured = service
            .handle(Gateway::Wechat, RawCallback::new(None, "<xml></xml>"))
            .await;
        assert!(unconfigured.acknowledgement.body.contains("FAIL"));
        assert!(matches!(
            unconfigured.result,
            Err(PaymentError::Verification(VerificationError::NotConfigured(
                Gateway::Wechat
            )))
        ));
    }
}
