use crate::domain::notification::Gateway;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ORDER_NO_MAX_LEN: usize = 64;

/// Unique payment order number, e.g. `PAY20250101000001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNo(String);

impl OrderNo {
    pub fn new(value: impl Into<String>) -> Result<Self, PaymentError> {
        let value = value.into();
        if value.is_empty() || value.len() > ORDER_NO_MAX_LEN {
            return Err(PaymentError::ValidationError(format!(
                "Order number must be 1..={ORDER_NO_MAX_LEN} characters"
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(PaymentError::ValidationError(format!(
                "Order number `{value}` contains invalid characters"
            )));
        }
        Ok(Self(value))
    }

    /// `PAY` + `YYYYMMDDHHMMSS` + 8 random uppercase hex digits.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        Self(format!("PAY{}{}", now.format("%Y%m%d%H%M%S"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderNo {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrderNo> for String {
    fn from(order_no: OrderNo) -> Self {
        order_no.0
    }
}

impl FromStr for OrderNo {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A positive monetary amount with at most two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if value.normalize().scale() > 2 {
            return Err(PaymentError::ValidationError(format!(
                "Amount {value} has more than 2 decimal places"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    AlipayWeb,
    AlipayQr,
    WechatPay,
    HupiPay,
}

impl PaymentMethod {
    /// The gateway whose callbacks settle orders paid this way.
    pub fn gateway(&self) -> Gateway {
        match self {
            PaymentMethod::AlipayWeb | PaymentMethod::AlipayQr => Gateway::Alipay,
            PaymentMethod::WechatPay => Gateway::Wechat,
            PaymentMethod::HupiPay => Gateway::HupiPay,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Refunding,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunding => "refunding",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Terminal for gateway callbacks. `Paid` only leaves through a local refund.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Failed | OrderStatus::Refunded
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Paid, OrderStatus::Refunding)
                | (OrderStatus::Refunding, OrderStatus::Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment intent in the ledger.
///
/// Status only moves along the edges accepted by [`OrderStatus::can_transition_to`];
/// every mutator checks the edge before touching any other field.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub order_no: OrderNo,
    pub amount: Amount,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    /// Provider transaction id, set once when the payment is confirmed.
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        order_no: OrderNo,
        amount: Amount,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_no,
            amount,
            payment_method,
            status: OrderStatus::Pending,
            transaction_id: None,
            paid_at: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// pending -> paid
    pub fn mark_paid(
        &mut self,
        transaction_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        self.transition(OrderStatus::Paid, now)?;
        self.transaction_id = Some(transaction_id.into());
        self.paid_at = Some(now);
        Ok(())
    }

    /// pending -> failed
    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> Result<(), PaymentError> {
        self.transition(OrderStatus::Failed, now)
    }

    /// paid -> refunding
    pub fn begin_refund(&mut self, now: DateTime<Utc>) -> Result<(), PaymentError> {
        self.transition(OrderStatus::Refunding, now)
    }

    /// refunding -> refunded
    pub fn complete_refund(&mut self, now: DateTime<Utc>) -> Result<(), PaymentError> {
        self.transition(OrderStatus::Refunded, now)?;
        self.refunded_at = Some(now);
        Ok(())
    }
}
