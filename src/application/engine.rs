use crate::application::binder::{BindOutcome, EnrollmentBinder};
use crate::application::locks::OrderLocks;
use crate::domain::notification::{Notification, ProviderStatus};
use crate::domain::order::{Order, OrderNo, OrderStatus};
use crate::domain::ports::OrderStoreHandle;
use crate::error::{PaymentError, Result, VerificationError};
use chrono::Utc;
use tracing::{debug, error, info, warn};

/// What applying a notification did to the ledger.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Reconciliation {
    Applied {
        from: OrderStatus,
        to: OrderStatus,
        bind: BindOutcome,
    },
    /// The ledger already reflects this notification; nothing was written.
    Duplicate(OrderStatus),
}

/// Applies verified gateway notifications to the order ledger.
///
/// Every read-modify-write of an order runs under that order's lock, and the
/// final write is conditional on the status read at the start, so concurrent
/// deliveries of the same callback serialize and the later ones observe the
/// first one's result.
pub struct ReconciliationEngine {
    orders: OrderStoreHandle,
    binder: EnrollmentBinder,
    locks: OrderLocks,
}

impl ReconciliationEngine {
    /// `locks` is shared with anything else that must not interleave with a
    /// settlement, such as checkout re-pointing an enrollment.
    pub fn new(orders: OrderStoreHandle, binder: EnrollmentBinder, locks: OrderLocks) -> Self {
        Self {
            orders,
            binder,
            locks,
        }
    }

    pub async fn apply(&self, notification: &Notification) -> Result<Reconciliation> {
        let _guard = self.locks.acquire(&notification.order_no).await;

        let Some(mut order) = self.orders.get(&notification.order_no).await? else {
            warn!(
                key = %notification.idempotency_key(),
                "callback for unknown order"
            );
            return Err(PaymentError::OrderNotFound(notification.order_no.clone()));
        };

        check_origin(&order, notification)?;

        let from = order.status;
        let to = notification.provider_status.target();
        if is_duplicate(&order, notification)? {
            debug!(key = %notification.idempotency_key(), "duplicate delivery");
            // A bind that failed after the order was written is completed here.
            self.binder.bind(&order).await?;
            return Ok(Reconciliation::Duplicate(from));
        }
        if from.is_terminal() {
            error!(
                order_no = %order.order_no,
                current = %from,
                requested = %to,
                raw_status = %notification.raw_status,
                "gateway disagrees with settled order"
            );
            return Err(PaymentError::ConflictingState {
                order_no: order.order_no,
                current: from,
                requested: to,
            });
        }

        let now = Utc::now();
        match notification.provider_status {
            ProviderStatus::Paid => {
                let transaction_id = notification.transaction_id.clone().ok_or_else(|| {
                    VerificationError::MissingField {
                        gateway: notification.gateway,
                        field: "transaction_id",
                    }
                })?;
                order.mark_paid(transaction_id, now)?
            }
            ProviderStatus::Failed => order.mark_failed(now)?,
            ProviderStatus::Refunded => order.complete_refund(now)?,
        }

        let bind = self.commit(order, from).await?;
        Ok(Reconciliation::Applied { from, to, bind })
    }

    /// Starts the local refund flow: paid -> refunding.
    pub async fn begin_refund(&self, order_no: &OrderNo) -> Result<Reconciliation> {
        let _guard = self.locks.acquire(order_no).await;

        let mut order = self
            .orders
            .get(order_no)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_no.clone()))?;
        let from = order.status;
        order.begin_refund(Utc::now())?;

        let bind = self.commit(order, from).await?;
        Ok(Reconciliation::Applied {
            from,
            to: OrderStatus::Refunding,
            bind,
        })
    }

    async fn commit(&self, order: Order, expected: OrderStatus) -> Result<BindOutcome> {
        let order_no = order.order_no.clone();
        if !self.orders.update_if(order.clone(), expected).await? {
            return Err(PaymentError::ConcurrentUpdate(order_no));
        }
        info!(
            order_no = %order_no,
            from = %expected,
            to = %order.status,
            transaction_id = order.transaction_id.as_deref().unwrap_or(""),
            "order transitioned"
        );
        self.binder.bind(&order).await
    }
}

/// Rejects notifications that cannot belong to this order.
fn check_origin(order: &Order, notification: &Notification) -> Result<()> {
    let expected = order.payment_method.gateway();
    if notification.gateway != expected {
        return Err(VerificationError::GatewayMismatch {
            order_no: order.order_no.clone(),
            expected,
            actual: notification.gateway,
        }
        .into());
    }
    if let Some(actual) = notification.amount
        && actual != order.amount.value()
    {
        warn!(order_no = %order.order_no, %actual, expected = %order.amount, "amount mismatch");
        return Err(PaymentError::AmountMismatch {
            order_no: order.order_no.clone(),
            expected: order.amount.value(),
            actual,
        });
    }
    Ok(())
}

/// True when the ledger already holds what the notification reports.
///
/// A repeated payment confirmation also counts once the order has moved on to
/// the refund path, as long as it names the same transaction.
fn is_duplicate(order: &Order, notification: &Notification) -> Result<bool> {
    let target = notification.provider_status.target();
    let settled_payment = matches!(
        order.status,
        OrderStatus::Paid | OrderStatus::Refunding | OrderStatus::Refunded
    );
    if target == OrderStatus::Paid && settled_payment {
        return match (&order.transaction_id, &notification.transaction_id) {
            (Some(ours), Some(theirs)) if ours != theirs => {
                error!(
                    order_no = %order.order_no,
                    recorded = %ours,
                    reported = %theirs,
                    "second payment reported for settled order"
                );
                Err(PaymentError::ConflictingState {
                    order_no: order.order_no.clone(),
                    current: order.status,
                    requested: target,
                })
            }
            _ => Ok(true),
        };
    }
    Ok(order.status == target)
}
