use crate::domain::order::{OrderNo, OrderStatus};
use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External payment provider delivering asynchronous result callbacks.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Alipay,
    Wechat,
    #[serde(rename = "hupipay")]
    HupiPay,
}

impl Gateway {
    pub const ALL: [Gateway; 3] = [Gateway::Alipay, Gateway::Wechat, Gateway::HupiPay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Alipay => "alipay",
            Gateway::Wechat => "wechat",
            Gateway::HupiPay => "hupipay",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gateway {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gateway::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| PaymentError::ValidationError(format!("Unknown gateway `{s}`")))
    }
}

/// Payment outcome reported by a provider, already mapped from its own vocabulary.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProviderStatus {
    Paid,
    Failed,
    Refunded,
}

impl ProviderStatus {
    /// Order status this outcome asks the ledger to reach.
    pub fn target(&self) -> OrderStatus {
        match self {
            ProviderStatus::Paid => OrderStatus::Paid,
            ProviderStatus::Failed => OrderStatus::Failed,
            ProviderStatus::Refunded => OrderStatus::Refunded,
        }
    }
}

/// A verified, provider-neutral callback. Never persisted.
#[derive(Debug, PartialEq, Clone)]
pub struct Notification {
    pub gateway: Gateway,
    pub order_no: OrderNo,
    pub provider_status: ProviderStatus,
    pub transaction_id: Option<String>,
    /// Amount the provider says was charged, when the payload carries one.
    pub amount: Option<Decimal>,
    /// Status string exactly as the provider sent it, kept for logs.
    pub raw_status: String,
}

impl Notification {
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.gateway,
            self.order_no,
            self.provider_status.target()
        )
    }
}
