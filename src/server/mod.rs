//! Capability modules.
//!
//! Each module in this subsystem owns exactly one listening/running resource
//! and exposes the same lifecycle shape:
//!
//! ```text
//! new(address) ──▶ start(register_fns)  ── binds, registers, signals ready,
//!                        │                 blocks until shutdown
//!                        ▼
//!                  stop(timeout)        ── triggers graceful drain, waits
//!                                          for the serve loop to finish
//! ```
//!
//! # Design Decisions
//! - Listening resources are created lazily, inside `start`, never in `new`
//! - Readiness is announced via [`ReadySignal`] after binding+registration
//!   and before serving: observers of readiness never race with a
//!   not-yet-accepting listener
//! - Double-start is an explicit error for every module; stop is idempotent
//!   and safe against a concurrently binding start
//! - Modules start concurrently and independently; there is no cross-module
//!   ordering guarantee

pub mod db;
pub mod health;
pub mod http;
pub mod metrics;
pub mod ready;
pub mod rpc;
pub mod worker;

pub use db::{Database, ReaderDatabase};
pub use health::HealthServer;
pub use http::{HttpRegisterFn, HttpServer};
pub use metrics::MetricsServer;
pub use ready::ReadySignal;
pub use rpc::{RpcRegisterFn, RpcServer};
pub use worker::{TaskFailure, WorkerPool, WorkerTaskFn};
