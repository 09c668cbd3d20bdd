//! SQL migration runner.

use std::path::Path;

use sqlx::migrate::Migrator;
use sqlx::PgPool;

use crate::error::Error;

/// Applies every migration under `path` (a directory of sqlx migration
/// files) to the given pool.
pub async fn migrate(pool: &PgPool, path: &Path) -> Result<(), Error> {
    let migrator = Migrator::new(path.to_owned())
        .await
        .map_err(|err| Error::Migration(format!("failed to load migrations: {err}")))?;

    migrator
        .run(pool)
        .await
        .map_err(|err| Error::Migration(err.to_string()))
}
