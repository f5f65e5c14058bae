//! Observability module: structured logging, metrics, and distributed tracing

pub mod metrics;
pub mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;
