//! Crate-wide error type.
//!
//! Every failure carries enough context (which module, which operation) to be
//! logged structurally. Expected failure paths never panic; capability hooks
//! that the original design enforced with runtime panics are instead required
//! trait methods checked at compile time.

use thiserror::Error;

/// Boxed error returned by worker tasks and wrapped transport errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by servicekit modules.
#[derive(Debug, Error)]
pub enum Error {
    /// A module's `start` was called a second time. Uniform across all
    /// modules: re-starting is always a caller bug, never a silent no-op.
    #[error("the {module} server was already started")]
    AlreadyStarted { module: &'static str },

    /// Binding the listening address failed (in use, unresolvable).
    #[error("failed to create listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The serve loop terminated with a transport error.
    #[error("the {module} server returned an error: {source}")]
    Serve {
        module: &'static str,
        #[source]
        source: BoxError,
    },

    /// Graceful shutdown did not finish within the caller's deadline.
    #[error("timed out waiting for the {module} server to stop")]
    ShutdownTimeout { module: &'static str },

    /// None of the database environment variables were present.
    #[error("no database configuration available on environment variables")]
    NoDatabaseConfig,

    /// Database environment variables were present but unusable.
    #[error("invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),

    /// Pool construction or the connectivity probe failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Running migrations failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),

    /// Command-line parsing failed.
    #[error(transparent)]
    Cli(#[from] clap::Error),
}
