//! Application layer containing the reconciliation orchestration.
//!
//! `ReconciliationEngine` applies verified notifications to the ledger under
//! per-order locks, `EnrollmentBinder` propagates settled orders to their
//! enrollment, `CallbackService` ties gateway verification to the engine, and
//! `CheckoutService` opens new orders for enrollments.

pub mod binder;
pub mod callbacks;
pub mod checkout;
pub mod engine;
pub mod locks;

use crate::domain::ports::{EnrollmentStoreHandle, OrderStoreHandle};
use crate::interfaces::gateway::GatewayRegistry;
use binder::EnrollmentBinder;
use callbacks::CallbackService;
use checkout::CheckoutService;
use engine::ReconciliationEngine;
use locks::OrderLocks;
use std::sync::Arc;

/// Everything a transport needs, wired over one pair of stores.
#[derive(Clone)]
pub struct PaymentServices {
    pub engine: Arc<ReconciliationEngine>,
    pub callbacks: Arc<CallbackService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: OrderStoreHandle,
    pub enrollments: EnrollmentStoreHandle,
}

impl PaymentServices {
    pub fn new(
        orders: OrderStoreHandle,
        enrollments: EnrollmentStoreHandle,
        registry: GatewayRegistry,
    ) -> Self {
        let locks = OrderLocks::new();
        let engine = Arc::new(ReconciliationEngine::new(
            orders.clone(),
            EnrollmentBinder::new(enrollments.clone()),
            locks.clone(),
        ));
        Self {
            callbacks: Arc::new(CallbackService::new(registry, engine.clone())),
            checkout: Arc::new(CheckoutService::new(
                orders.clone(),
                enrollments.clone(),
                locks,
            )),
            engine,
            orders,
            enrollments,
        }
    }
}
