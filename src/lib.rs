//! Service lifecycle toolkit.
//!
//! Building blocks for long-running services: a host declares the runtime
//! capabilities it supports (gRPC, HTTP, background workers, database
//! access, health/metrics endpoints) by implementing small one-method
//! traits, and [`cmd::ServerCommand`] configures, starts, supervises and
//! gracefully tears down exactly those capabilities.
//!
//! # Architecture Overview
//!
//! ```text
//!          ┌──────────────────────────────────────────────────────┐
//!          │                    ServerCommand                      │
//!          │                                                       │
//!          │  configure phase          watcher          start      │
//!          │  ┌────────────┐     ┌───────────────┐  ┌───────────┐ │
//!          │  │ build each │     │ SIGTERM/SIGINT│  │ primary   │ │
//!          │  │ enabled    │────▶│ or token ────▶│  │ Server::  │ │
//!          │  │ capability │     │ Server::stop  │  │ start     │ │
//!          │  └────────────┘     └───────────────┘  └───────────┘ │
//!          └──────────────────────────┬───────────────────────────┘
//!                                     │ host fans out to
//!          ┌──────────┬──────────┬────┴─────┬────────────┬────────┐
//!          │RpcServer │HttpServer│WorkerPool│HealthServer│Metrics │
//!          └──────────┴──────────┴──────────┴────────────┴────────┘
//! ```
//!
//! Each capability module owns one listening/running resource, announces
//! readiness through a broadcast-once [`server::ReadySignal`], and tears
//! down gracefully on `stop`.

// Core subsystems
pub mod cmd;
pub mod database;
pub mod server;

// Cross-cutting concerns
pub mod error;
pub mod observability;

// Identifier and validation helpers
pub mod id;
pub mod validations;

pub use cmd::{
    HasDatabase, HasHealthcheck, HasHttp, HasMetrics, HasReaderDatabase, HasRpc, HasWorker,
    Server, ServerCommand,
};
pub use error::Error;
pub use server::{
    Database, HealthServer, HttpServer, MetricsServer, ReaderDatabase, ReadySignal, RpcServer,
    WorkerPool,
};
