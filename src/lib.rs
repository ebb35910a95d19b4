//! presale-ranker - live ranking engine for crypto presale listings
//!
//! This crate loads a catalog of presale records, attaches live market metrics
//! (simulated or pulled from a market-data API), scores them and keeps a ranked
//! list refreshed on a fixed cadence.

pub mod types;
pub mod catalog;
pub mod summary;
pub mod ranking;

// Re-export main types for convenience
pub use types::{PresaleRecord, PresaleStatus, RaiseAmount};
pub use catalog::PresaleCatalog;
