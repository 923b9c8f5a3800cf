use crate::domain::enrollment::EnrollmentStatus;
use crate::domain::notification::Gateway;
use crate::domain::order::{OrderNo, OrderStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons an inbound callback is refused before it reaches the ledger.
#[derive(Error, Debug, PartialEq)]
pub enum VerificationError {
    #[error("no adapter configured for {0}")]
    NotConfigured(Gateway),
    #[error("malformed {gateway} payload: {reason}")]
    Malformed { gateway: Gateway, reason: String },
    #[error("{gateway} payload is missing `{field}`")]
    MissingField {
        gateway: Gateway,
        field: &'static str,
    },
    #[error("signature check failed for {0} callback")]
    BadSignature(Gateway),
    #[error("{gateway} callback addressed to `{actual}`, expected `{expected}`")]
    AppMismatch {
        gateway: Gateway,
        expected: String,
        actual: String,
    },
    #[error("unsupported {gateway} status `{status}`")]
    UnsupportedStatus { gateway: Gateway, status: String },
    #[error("order {order_no} is paid through {expected}, not {actual}")]
    GatewayMismatch {
        order_no: OrderNo,
        expected: Gateway,
        actual: Gateway,
    },
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),
    #[error("Order {0} not found")]
    OrderNotFound(OrderNo),
    #[error("Order {order_no} is already {current}, refusing {requested}")]
    ConflictingState {
        order_no: OrderNo,
        current: OrderStatus,
        requested: OrderStatus,
    },
    #[error("Invalid transition {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Order {order_no} amount is {expected}, callback reported {actual}")]
    AmountMismatch {
        order_no: OrderNo,
        expected: Decimal,
        actual: Decimal,
    },
    #[error("Order {0} changed while being updated")]
    ConcurrentUpdate(OrderNo),
    #[error("Order {0} already exists")]
    DuplicateOrder(OrderNo),
    #[error("Enrollment {0} not found")]
    EnrollmentNotFound(u64),
    #[error("Enrollment {0} is already paid")]
    AlreadyPaid(u64),
    #[error("Enrollment {id} is {status}, no payment can be opened")]
    EnrollmentClosed { id: u64, status: EnrollmentStatus },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// True when retrying the same callback later cannot change the result.
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            PaymentError::IoError(_)
                | PaymentError::InternalError(_)
                | PaymentError::ConcurrentUpdate(_)
        ) && !self.is_storage()
    }

    #[cfg(feature = "storage-rocksdb")]
    fn is_storage(&self) -> bool {
        matches!(self, PaymentError::StorageError(_))
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn is_storage(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
