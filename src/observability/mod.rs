//! Observability subsystem.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (structured logging)
//! - Own the process-global Prometheus recorder
//! - Provide the request metric helpers used by the server middleware
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Log level configurable via `RUST_LOG`
//! - One recorder per process, installed lazily on first use

pub mod logging;
pub mod metrics;
