//! Runner allocator service
//!
//! Serves the allocation engine over HTTP next to health probes and
//! Prometheus metrics.

pub mod api;
pub mod config;
pub mod health;
