//! Database access capability.

use sqlx::PgPool;

use crate::database::Config;
use crate::error::Error;

/// The database capability: a pooled Postgres handle built once from
/// configuration and shared read-only thereafter.
///
/// Construction either fully succeeds — pool built with the configured
/// tuning parameters and a `SELECT 1` connectivity probe — or fails, in
/// which case the capability is never installed. There is no
/// half-initialized state.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Opens the connection pool and probes it.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let pool = open_pool(config).await?;
        Ok(Self { pool })
    }

    /// Returns the shared connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A second database capability meant for read-only operations.
///
/// There is no semantic restriction; it simply provides a separate pool (on
/// top of [`Database`]) so read traffic can be pointed at a replica.
#[derive(Clone)]
pub struct ReaderDatabase {
    pool: PgPool,
}

impl ReaderDatabase {
    /// Opens the connection pool and probes it.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let pool = open_pool(config).await?;
        Ok(Self { pool })
    }

    /// Returns the shared connection pool, meant for read-only operations.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn open_pool(config: &Config) -> Result<PgPool, Error> {
    let pool = config.pool_options().connect(&config.connect_url()).await?;

    // Connectivity probe: fail construction rather than hand out a pool
    // that cannot reach the database.
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}
