//! Shared helpers for the binary and the background tasks.

pub mod bootstrap;
pub mod retry;
