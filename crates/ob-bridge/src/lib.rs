//! # ob-bridge
//!
//! The short-lived local RPC service an external optimizer process calls back
//! into. Two routes, `GET /estimate_cost` and `POST /register_report`, are
//! routed through one middleware into a [`CostEstimator`] that owns the attempt
//! counter and the once-only report latch.

mod api;
mod client;
mod estimator;
mod server;

pub use api::{
    Endpoint, ErrorResponse, EstimateCostRequest, EstimateCostResponse, RegisterReportRequest,
    RegisterReportResponse,
};
pub use client::{BridgeClient, ClientError};
pub use estimator::CostEstimator;
pub use server::{status_code, BridgeServer};
