use crate::domain::order::{OrderNo, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Paid,
    Refunding,
    Refunded,
    Cancelled,
}

impl EnrollmentStatus {
    /// Status an enrollment takes when its order reaches `status`.
    ///
    /// `None` means the order outcome leaves the enrollment as it is.
    pub fn mirroring(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Paid => Some(EnrollmentStatus::Paid),
            OrderStatus::Refunding => Some(EnrollmentStatus::Refunding),
            OrderStatus::Refunded => Some(EnrollmentStatus::Refunded),
            OrderStatus::Pending | OrderStatus::Failed => None,
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Paid => "paid",
            EnrollmentStatus::Refunding => "refunding",
            EnrollmentStatus::Refunded => "refunded",
            EnrollmentStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A student's registration for a course.
///
/// Reads its payment state from the referenced order and never writes to it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Enrollment {
    pub id: u64,
    /// Amount due. Zero until a price has been settled.
    pub amount: Decimal,
    pub status: EnrollmentStatus,
    pub order_no: Option<OrderNo>,
}

impl Enrollment {
    pub fn new(id: u64, amount: Decimal) -> Self {
        Self {
            id,
            amount,
            status: EnrollmentStatus::Pending,
            order_no: None,
        }
    }
}
