//! Ledger entities and the ports the application layer talks through.

pub mod enrollment;
pub mod notification;
pub mod order;
pub mod ports;
