pub mod crud;

use std::path::Path;

use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};

pub use crud::*;

pub type Database = SqlitePool;

/// Open (creating if missing) the sqlite database and run migrations.
/// A failure here is fatal to the process.
pub async fn init_db(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("opening database {}", filename.display());

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// In-memory database for unit tests. Single connection, so every query
/// sees the same sqlite memory instance.
#[cfg(test)]
pub async fn memory_db() -> Database {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    sqlx::migrate!().run(&pool).await.expect("failed to run migrations");
    pool
}
