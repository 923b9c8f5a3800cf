use crate::domain::order::{Amount, OrderNo, PaymentMethod};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

/// One seeded order together with the enrollment that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub enrollment: u64,
    pub order_no: OrderNo,
    pub amount: Amount,
    pub payment_method: PaymentMethod,
}

// Amounts are read as text so `599.00` keeps its scale.
#[derive(Debug, Deserialize)]
struct RawRow {
    enrollment: u64,
    order_no: OrderNo,
    amount: String,
    payment_method: PaymentMethod,
}

impl TryFrom<RawRow> for LedgerRow {
    type Error = PaymentError;

    fn try_from(row: RawRow) -> Result<Self> {
        let amount = Decimal::from_str(&row.amount)
            .map_err(|e| PaymentError::ValidationError(format!("amount `{}`: {e}", row.amount)))?;
        Ok(Self {
            enrollment: row.enrollment,
            order_no: row.order_no,
            amount: Amount::new(amount)?,
            payment_method: row.payment_method,
        })
    }
}

/// Reads `enrollment,order_no,amount,payment_method` rows from a CSV source.
pub struct LedgerReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> LedgerReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows; a bad row yields an error and reading goes on.
    pub fn rows(self) -> impl Iterator<Item = Result<LedgerRow>> {
        self.reader
            .into_deserialize::<RawRow>()
            .map(|result| result.map_err(PaymentError::from).and_then(LedgerRow::try_from))
    }
}
