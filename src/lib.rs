//! topology-sync - network topology graph synchronizer
//!
//! Consumes BMP-derived link-state and BGP records, keeps the raw record
//! collections in a graph store current, and derives the IGP, IP and BGP
//! topology graphs from them. Updates for the same key are applied strictly
//! in order; updates for different keys run concurrently.

pub mod batch;
pub mod bus;
pub mod classify;
pub mod config;
pub mod ingest;
pub mod model;
pub mod notifier;
pub mod pipeline;
pub mod reconcile;
pub mod storage;
pub mod utils;
