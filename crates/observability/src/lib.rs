//! `leadops-observability` — process-wide tracing/logging setup.

pub mod tracing;

pub use crate::tracing::init;
