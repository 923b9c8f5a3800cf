//! Offline replay: seed a ledger from CSV, then feed recorded callbacks through
//! the same verification and reconciliation path the HTTP server uses.

use crate::application::PaymentServices;
use crate::application::engine::Reconciliation;
use crate::domain::enrollment::Enrollment;
use crate::domain::notification::Gateway;
use crate::domain::order::Order;
use crate::domain::ports::RawCallback;
use crate::error::{PaymentError, Result};
use crate::interfaces::csv::ledger_reader::LedgerRow;
use chrono::Utc;
use serde::Deserialize;
use std::io::BufRead;
use tracing::{Instrument, debug, info_span, warn};

/// A callback as captured from a gateway, one JSON object per line.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RecordedCallback {
    pub gateway: Gateway,
    #[serde(default)]
    pub content_type: Option<String>,
    pub body: String,
}

impl From<RecordedCallback> for RawCallback {
    fn from(recorded: RecordedCallback) -> Self {
        RawCallback::new(recorded.content_type, recorded.body)
    }
}

/// Reads recorded callbacks from JSON lines, skipping blank lines.
pub fn recorded_callbacks<R: BufRead>(source: R) -> impl Iterator<Item = Result<RecordedCallback>> {
    source.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(PaymentError::from)),
        Err(e) => Some(Err(PaymentError::from(e))),
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Inserts each row's order as pending and links it to its enrollment.
///
/// Rows whose order number is already in the ledger are left alone, so a
/// persistent ledger can be replayed into more than once.
pub async fn seed_ledger(
    services: &PaymentServices,
    rows: impl IntoIterator<Item = Result<LedgerRow>>,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    for row in rows {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "Error reading ledger row");
                summary.skipped += 1;
                continue;
            }
        };
        if services.orders.get(&row.order_no).await?.is_some() {
            debug!(order_no = %row.order_no, "order already in ledger");
            summary.skipped += 1;
            continue;
        }

        let order = Order::new(row.order_no.clone(), row.amount, row.payment_method, Utc::now());
        services.orders.insert(order).await?;

        let mut enrollment = services
            .enrollments
            .get(row.enrollment)
            .await?
            .unwrap_or_else(|| Enrollment::new(row.enrollment, row.amount.value()));
        enrollment.order_no = Some(row.order_no);
        services.enrollments.store(enrollment).await?;
        summary.inserted += 1;
    }
    Ok(summary)
}

/// Replays callbacks in order. Failures are counted here and logged by the
/// callback service, inside a span carrying the line number.
pub async fn replay_callbacks(
    services: &PaymentServices,
    callbacks: impl IntoIterator<Item = Result<RecordedCallback>>,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for (line, callback) in callbacks.into_iter().enumerate() {
        let callback = match callback {
            Ok(callback) => callback,
            Err(e) => {
                warn!(line = line + 1, error = %e, "Error reading callback");
                summary.rejected += 1;
                continue;
            }
        };
        let outcome = services
            .callbacks
            .handle(callback.gateway, callback.into())
            .instrument(info_span!("replay", line = line + 1))
            .await;
        match outcome.result {
            Ok(Reconciliation::Applied { .. }) => summary.applied += 1,
            Ok(Reconciliation::Duplicate(_)) => summary.duplicates += 1,
            Err(_) => summary.rejected += 1,
        }
    }
    summary
}
