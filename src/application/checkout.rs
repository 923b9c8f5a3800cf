use crate::application::locks::{EnrollmentLocks, OrderLocks};
use crate::domain::enrollment::{Enrollment, EnrollmentStatus};
use crate::domain::order::{Amount, Order, OrderNo, OrderStatus, PaymentMethod};
use crate::domain::ports::{EnrollmentStoreHandle, OrderStoreHandle};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use tracing::info;

/// Opens payment orders for enrollments.
///
/// Holds the enrollment's lock for the whole call and the lock of the order it
/// currently references, which is the same lock settlements of that order take.
pub struct CheckoutService {
    orders: OrderStoreHandle,
    enrollments: EnrollmentStoreHandle,
    order_locks: OrderLocks,
    enrollment_locks: EnrollmentLocks,
}

impl CheckoutService {
    pub fn new(
        orders: OrderStoreHandle,
        enrollments: EnrollmentStoreHandle,
        order_locks: OrderLocks,
    ) -> Self {
        Self {
            orders,
            enrollments,
            order_locks,
            enrollment_locks: EnrollmentLocks::new(),
        }
    }

    /// Returns the pending order for `enrollment_id`, creating one if needed.
    ///
    /// An enrollment whose order is still pending keeps that order, whatever
    /// `method` is requested now. Only pending enrollments get a new order.
    pub async fn open_order(&self, enrollment_id: u64, method: PaymentMethod) -> Result<Order> {
        let _enrollment_guard = self.enrollment_locks.acquire(&enrollment_id).await;

        let current = self.load(enrollment_id).await?.order_no;
        let _order_guard = match &current {
            Some(order_no) => Some(self.order_locks.acquire(order_no).await),
            None => None,
        };
        // Re-read under the order lock: a settlement may have bound it meanwhile.
        let mut enrollment = self.load(enrollment_id).await?;

        match enrollment.status {
            EnrollmentStatus::Pending => {}
            EnrollmentStatus::Paid => return Err(PaymentError::AlreadyPaid(enrollment_id)),
            status => {
                return Err(PaymentError::EnrollmentClosed {
                    id: enrollment_id,
                    status,
                });
            }
        }

        if let Some(order_no) = &enrollment.order_no
            && let Some(order) = self.orders.get(order_no).await?
        {
            match order.status {
                OrderStatus::Pending => return Ok(order),
                OrderStatus::Failed => {}
                // Settled but not yet mirrored onto the enrollment.
                _ => return Err(PaymentError::AlreadyPaid(enrollment_id)),
            }
        }

        let amount = Amount::new(enrollment.amount).map_err(|_| {
            PaymentError::ValidationError(format!(
                "Enrollment {enrollment_id} has no payable amount"
            ))
        })?;
        let now = Utc::now();
        let order = Order::new(OrderNo::generate(now), amount, method, now);
        self.orders.insert(order.clone()).await?;

        enrollment.order_no = Some(order.order_no.clone());
        self.enrollments.store(enrollment).await?;

        info!(
            enrollment = enrollment_id,
            order_no = %order.order_no,
            amount = %order.amount,
            "payment order opened"
        );
        Ok(order)
    }

    async fn load(&self, enrollment_id: u64) -> Result<Enrollment> {
        self.enrollments
            .get(enrollment_id)
            .await?
            .ok_or(PaymentError::EnrollmentNotFound(enrollment_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::binder::EnrollmentBinder;
    use crate::application::engine::ReconciliationEngine;
    use crate::domain::notification::{Gateway, Notification, ProviderStatus};
    use crate::domain::ports::{EnrollmentStore, OrderStore};
    use crate::infrastructure::in_memory::{InMemoryEnrollmentStore, InMemoryOrderStore};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    async fn service(amount: Decimal) -> (CheckoutService, Arc<InMemoryOrderStore>, Arc<InMemoryEnrollmentStore>) {
        let orders = Arc::new(InMemoryOrderStore::new());
        let enrollments = Arc::new(InMemoryEnrollmentStore::new());
        enrollments.store(Enrollment::new(1, amount)).await.unwrap();
        (
            CheckoutService::new(orders.clone(), enrollments.clone(), OrderLocks::new()),
            orders,
            enrollments,
        )
    }

    async fn set_status(enrollments: &InMemoryEnrollmentStore, status: EnrollmentStatus) {
        let mut enrollment = enrollments.get(1).await.unwrap().unwrap();
        enrollment.status = status;
        enrollments.store(enrollment).await.unwrap();
    }

    /// Parks the first `get` after it has read, until released.
    #[derive(Default)]
    struct GatedEnrollmentStore {
        inner: InMemoryEnrollmentStore,
        reads: AtomicUsize,
        read_taken: Notify,
        release: Notify,
    }

    #[async_trait]
    impl EnrollmentStore for GatedEnrollmentStore {
        async fn store(&self, enrollment: Enrollment) -> Result<()> {
            self.inner.store(enrollment).await
        }

        async fn get(&self, id: u64) -> Result<Option<Enrollment>> {
            let snapshot = self.inner.get(id).await;
            if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
                self.read_taken.notify_one();
                self.release.notified().await;
            }
            snapshot
        }

        async fn find_by_order(&self, order_no: &OrderNo) -> Result<Option<Enrollment>> {
            self.inner.find_by_order(order_no).await
        }

        async fn get_all(&self) -> Result<Vec<Enrollment>> {
            self.inner.get_all().await
        }
    }

    #[tokio::test]
    async fn test_open_order_links_enrollment() {
        let (checkout, orders, enrollments) = service(dec!(599.00)).await;

        let order = checkout.open_order(1, PaymentMethod::AlipayWeb).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount.value(), dec!(599.00));
        assert!(order.order_no.as_str().starts_with("PAY"));

        let enrollment = enrollments.get(1).await.unwrap().unwrap();
        assert_eq!(enrollment.order_no, Some(order.order_no.clone()));
        assert_eq!(orders.get_all().await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn test_open_order_reuses_pending() {
        let (checkout, orders, _) = service(dec!(599.00)).await;

        let first = checkout.open_order(1, PaymentMethod::AlipayWeb).await.unwrap();
        let second = checkout.open_order(1, PaymentMethod::WechatPay).await.unwrap();
        assert_eq!(first.order_no, second.order_no);
        assert_eq!(second.payment_method, PaymentMethod::AlipayWeb);
        assert_eq!(orders.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_share_one_order() {
        let (checkout, orders, _) = service(dec!(599.00)).await;
        let checkout = Arc::new(checkout);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let checkout = checkout.clone();
                tokio::spawn(async move { checkout.open_order(1, PaymentMethod::AlipayQr).await })
            })
            .collect();
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().order_no);
        }

        numbers.dedup();
        assert_eq!(numbers.len(), 1);
        assert_eq!(orders.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_order_after_failure_creates_new() {
        let (checkout, orders, _) = service(dec!(599.00)).await;

        let mut first = checkout.open_order(1, PaymentMethod::HupiPay).await.unwrap();
        first.mark_failed(Utc::now()).unwrap();
        assert!(orders.update_if(first.clone(), OrderStatus::Pending).await.unwrap());

        let second = checkout.open_order(1, PaymentMethod::HupiPay).await.unwrap();
        assert_ne!(first.order_no, second.order_no);
        assert_eq!(orders.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_open_order_rejects_paid_enrollment() {
        let (checkout, _, enrollments) = service(dec!(599.00)).await;
        set_status(&enrollments, EnrollmentStatus::Paid).await;

        let result = checkout.open_order(1, PaymentMethod::AlipayQr).await;
        assert!(matches!(result, Err(PaymentError::AlreadyPaid(1))));
    }

    #[tokio::test]
    async fn test_open_order_rejects_closed_enrollments() {
        for status in [
            EnrollmentStatus::Refunding,
            EnrollmentStatus::Refunded,
            EnrollmentStatus::Cancelled,
        ] {
            let (checkout, orders, enrollments) = service(dec!(599.00)).await;
            set_status(&enrollments, status).await;

            let result = checkout.open_order(1, PaymentMethod::AlipayQr).await;
            assert!(
                matches!(result, Err(PaymentError::EnrollmentClosed { id: 1, status: s }) if s == status),
                "{status}: {result:?}"
            );
            assert!(orders.get_all().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_open_order_refuses_settled_order_not_yet_mirrored() {
        let (checkout, orders, _) = service(dec!(599.00)).await;
        let mut order = checkout.open_order(1, PaymentMethod::AlipayQr).await.unwrap();
        order.mark_paid("TXN123", Utc::now()).unwrap();
        assert!(orders.update_if(order, OrderStatus::Pending).await.unwrap());

        let result = checkout.open_order(1, PaymentMethod::AlipayQr).await;
        assert!(matches!(result, Err(PaymentError::AlreadyPaid(1))));
        assert_eq!(orders.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settlement_during_checkout_is_not_overwritten() {
        let orders = Arc::new(InMemoryOrderStore::new());
        let enrollments = Arc::new(GatedEnrollmentStore::default());
        let order_no = OrderNo::new("PAY20250101000001").unwrap();
        orders
            .insert(Order::new(
                order_no.clone(),
                Amount::new(dec!(599.00)).unwrap(),
                PaymentMethod::AlipayWeb,
                Utc::now(),
            ))
            .await
            .unwrap();
        let mut enrollment = Enrollment::new(1, dec!(599.00));
        enrollment.order_no = Some(order_no.clone());
        enrollments.inner.store(enrollment).await.unwrap();

        let locks = OrderLocks::new();
        let checkout = Arc::new(CheckoutService::new(
            orders.clone(),
            enrollments.clone(),
            locks.clone(),
        ));
        let engine = ReconciliationEngine::new(
            orders.clone(),
            EnrollmentBinder::new(enrollments.clone()),
            locks,
        );

        let reopen = {
            let checkout = checkout.clone();
            tokio::spawn(async move { checkout.open_order(1, PaymentMethod::AlipayWeb).await })
        };
        enrollments.read_taken.notified().await;

        let paid = Notification {
            gateway: Gateway::Alipay,
            order_no: order_no.clone(),
            provider_status: ProviderStatus::Paid,
            transaction_id: Some("TXN123".to_string()),
            amount: Some(dec!(599.00)),
            raw_status: "TRADE_SUCCESS".to_string(),
        };
        engine.apply(&paid).await.unwrap();
        enrollments.release.notify_one();

        let result = reopen.await.unwrap();
        assert!(matches!(result, Err(PaymentError::AlreadyPaid(1))));
        let enrollment = enrollments.inner.get(1).await.unwrap().unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Paid);
        assert_eq!(enrollment.order_no, Some(order_no));
        assert_eq!(orders.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_order_requires_amount() {
        let (checkout, orders, _) = service(Decimal::ZERO).await;
        let result = checkout.open_order(1, PaymentMethod::AlipayQr).await;
        assert!(matches!(result, Err(PaymentError::ValidationError(_))));
        assert!(orders.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_order_unknown_enrollment() {
        let (checkout, _, _) = service(dec!(1)).await;
        let result = checkout.open_order(42, PaymentMethod::AlipayQr).await;
        assert!(matches!(result, Err(PaymentError::EnrollmentNotFound(42))));
    }
}
