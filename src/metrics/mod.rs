//! Metrics Module
//!
//! Prometheus counters for authentication and admission outcomes.

pub mod collector;

pub use collector::Metrics;
