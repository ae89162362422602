use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("Item not found in database: {0}")]
    NotFound(String),
}

/// Placeholder list (`?, ?, ?`) for SQL built from optional clauses.
pub(crate) type SqlArgs<'a> = Vec<&'a dyn rusqlite::ToSql>;

pub mod comments_db_operations;
pub mod posts_db_operations;
pub mod taxonomy_db_operations;
pub mod users_db_operations;
