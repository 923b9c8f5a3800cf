use super::enrollment::Enrollment;
use super::notification::{Gateway, Notification};
use super::order::{Order, OrderNo, OrderStatus};
use crate::error::{Result, VerificationError};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order. Fails with `DuplicateOrder` if the number is taken.
    async fn insert(&self, order: Order) -> Result<()>;
    async fn get(&self, order_no: &OrderNo) -> Result<Option<Order>>;
    /// Writes `order` only if the stored status still equals `expected`.
    ///
    /// Returns `false` without writing when the status moved underneath the caller.
    async fn update_if(&self, order: Order, expected: OrderStatus) -> Result<bool>;
    async fn get_all(&self) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn store(&self, enrollment: Enrollment) -> Result<()>;
    async fn get(&self, id: u64) -> Result<Option<Enrollment>>;
    async fn find_by_order(&self, order_no: &OrderNo) -> Result<Option<Enrollment>>;
    async fn get_all(&self) -> Result<Vec<Enrollment>>;
}

/// Per-provider authenticity check and payload normalization.
pub trait GatewayAdapter: Send + Sync {
    fn gateway(&self) -> Gateway;
    /// Verifies the raw callback body and extracts a [`Notification`].
    fn verify(&self, raw: &RawCallback) -> std::result::Result<Notification, VerificationError>;
}

/// Inbound callback exactly as received from the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCallback {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawCallback {
    pub fn new(content_type: Option<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type,
            body: body.into(),
        }
    }
}

pub type OrderStoreHandle = Arc<dyn OrderStore>;
pub type EnrollmentStoreHandle = Arc<dyn EnrollmentStore>;
pub type GatewayAdapterBox = Box<dyn GatewayAdapter>;
