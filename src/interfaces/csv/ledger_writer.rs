use crate::domain::order::{Order, OrderStatus, PaymentMethod};
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LedgerRecord<'a> {
    order_no: &'a str,
    amount: String,
    payment_method: PaymentMethod,
    status: OrderStatus,
    transaction_id: Option<&'a str>,
    paid_at: Option<String>,
    refunded_at: Option<String>,
}

fn timestamp(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Writes the ledger as CSV, one row per order, in the order given.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, orders: &[Order]) -> Result<()> {
        for order in orders {
            self.writer.serialize(LedgerRecord {
                order_no: order.order_no.as_str(),
                amount: order.amount.to_string(),
                payment_method: order.payment_method,
                status: order.status,
                transaction_id: order.transaction_id.as_deref(),
                paid_at: timestamp(order.paid_at),
                refunded_at: timestamp(order.refunded_at),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
