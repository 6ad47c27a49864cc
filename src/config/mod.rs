//! Configuration Module
//!
//! Handles configuration loading, environment overrides and validation.

pub mod manager;
pub mod types;

pub use manager::ConfigManager;
pub use types::*;
