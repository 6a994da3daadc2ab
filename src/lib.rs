//! Broker Trade Reconciliation
//!
//! Reconciles a broker-issued trade log into positions (contiguous holding
//! periods per ticker) and a derived daily equity curve, with a full-rebuild
//! mode and an incremental append mode against persisted state.

pub mod builder;
pub mod calc;
pub mod config;
pub mod equity;
pub mod ingest;
pub mod merger;
pub mod metrics;
pub mod report;
pub mod session;
pub mod store;
pub mod types;

pub use config::Config;
pub use types::*;
