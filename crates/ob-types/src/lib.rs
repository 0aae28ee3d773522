//! # ob-types
//!
//! Shared vocabulary of OptBridge: parameter descriptions, the run
//! configuration, the final report, and the error taxonomy used by the bridge
//! and the orchestration.

pub mod config;
pub mod errors;
pub mod parameter;
pub mod report;

pub use config::*;
pub use errors::*;
pub use parameter::*;
pub use report::*;
