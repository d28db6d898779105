//! RateFeed Library
//!
//! Scrapes marketplace listings for game currencies and publishes
//! aggregated RUB prices as a JSON snapshot.

pub mod config;
pub mod logging;
pub mod persistence;
pub mod pricing;
pub mod runner;
pub mod sources;
pub mod types;
