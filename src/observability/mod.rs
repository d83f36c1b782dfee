//! # Observability
//!
//! - `logging`: `tracing` subscriber initialisation
//! - `metrics`: Prometheus metrics collection

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, DEFAULT_LOG_FILTER};
