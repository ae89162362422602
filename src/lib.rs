use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
pub type DbPool = Pool<SqliteConnectionManager>;

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;

fn with_pragmas(manager: SqliteConnectionManager) -> SqliteConnectionManager {
    manager.with_init(|conn| conn.execute_batch(setup::db_setup::CONNECTION_PRAGMAS))
}

/// Pool over the blog database file; every connection enforces foreign keys.
pub fn open_pool(db_path: &Path) -> Result<DbPool, r2d2::Error> {
    Pool::builder().build(with_pragmas(SqliteConnectionManager::file(db_path)))
}

/// Single-connection pool over a private in-memory database.
pub fn open_memory_pool() -> Result<DbPool, r2d2::Error> {
    Pool::builder()
        .max_size(1)
        .build(with_pragmas(SqliteConnectionManager::memory()))
}
