use crate::domain::enrollment::Enrollment;
use crate::domain::order::{Order, OrderNo, OrderStatus};
use crate::domain::ports::{EnrollmentStore, OrderStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory order ledger.
///
/// Uses `Arc<RwLock<HashMap<OrderNo, Order>>>` to allow shared concurrent access.
/// The conditional update checks and writes under a single write guard.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderNo, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_no) {
            return Err(PaymentError::DuplicateOrder(order.order_no));
        }
        orders.insert(order.order_no.clone(), order);
        Ok(())
    }

    async fn get(&self, order_no: &OrderNo) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_no).cloned())
    }

    async fn update_if(&self, order: Order, expected: OrderStatus) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.order_no) {
            Some(current) if current.status == expected => {
                *current = order;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PaymentError::OrderNotFound(order.order_no)),
        }
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by(|a, b| a.order_no.cmp(&b.order_no));
        Ok(all)
    }
}

/// A thread-safe in-memory store for enrollments.
#[derive(Default, Clone)]
pub struct InMemoryEnrollmentStore {
    enrollments: Arc<RwLock<HashMap<u64, Enrollment>>>,
}

impl InMemoryEnrollmentStore {
    /// Creates a new, empty in-memory enrollment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn store(&self, enrollment: Enrollment) -> Result<()> {
        let mut enrollments = self.enrollments.write().await;
        enrollments.insert(enrollment.id, enrollment);
        Ok(())
    }

    async fn get(&self, id: u64) -> Result<Option<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments.get(&id).cloned())
    }

    async fn find_by_order(&self, order_no: &OrderNo) -> Result<Option<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments
            .values()
            .find(|e| e.order_no.as_ref() == Some(order_no))
            .cloned())
    }

    async fn get_all(&self) -> Result<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        let mut all: Vec<Enrollment> = enrollments.values().cloned().collect();
        all.sort_by_key(|e| e.id);
        Ok(all)
    }
}
