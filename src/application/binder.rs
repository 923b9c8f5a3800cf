use crate::domain::enrollment::EnrollmentStatus;
use crate::domain::order::Order;
use crate::domain::ports::EnrollmentStoreHandle;
use crate::error::Result;
use tracing::{info, warn};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BindOutcome {
    /// The enrollment was moved to this status.
    Bound(EnrollmentStatus),
    /// The enrollment already reflects the order, or the order outcome does not concern it.
    Unchanged,
    /// No enrollment references the order.
    Unbound,
}

/// Propagates an order's settled state to the enrollment that created it.
pub struct EnrollmentBinder {
    enrollments: EnrollmentStoreHandle,
}

impl EnrollmentBinder {
    pub fn new(enrollments: EnrollmentStoreHandle) -> Self {
        Self { enrollments }
    }

    pub async fn bind(&self, order: &Order) -> Result<BindOutcome> {
        let Some(mut enrollment) = self.enrollments.find_by_order(&order.order_no).await? else {
            warn!(order_no = %order.order_no, status = %order.status, "no enrollment references order");
            return Ok(BindOutcome::Unbound);
        };

        match EnrollmentStatus::mirroring(order.status) {
            Some(status) if enrollment.status != status => {
                let previous = enrollment.status;
                enrollment.status = status;
                self.enrollments.store(enrollment.clone()).await?;
                info!(
                    enrollment = enrollment.id,
                    order_no = %order.order_no,
                    from = %previous,
                    to = %status,
                    "enrollment bound"
                );
                Ok(BindOutcome::Bound(status))
            }
            _ => Ok(BindOutcome::Unchanged),
        }
    }
}
