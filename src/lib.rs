//! Class slot booking with payment-gateway reconciliation.
//!
//! Bookings claim slots from a finite schedule capacity ([`reservation`]), move
//! through a small lifecycle ([`lifecycle`]), and are confirmed or cancelled by
//! signed, at-least-once gateway notifications ([`reconciliation`]). A periodic
//! [`sweeper`] finishes bookings whose class has ended.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod dtos;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod listing;
pub mod models;
pub mod reconciliation;
pub mod reservation;
pub mod routes;
pub mod schema;
pub mod simulate;
pub mod sweeper;

pub use error::{BookingError, ErrorKind};

use crate::config::GatewayConfig;
use crate::gateway::PaymentGateway;
use crate::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub gateway: Arc<dyn PaymentGateway>,
    pub gateway_config: Arc<GatewayConfig>,
}

pub fn app(state: AppState) -> axum::Router {
    routes::router(state)
}
