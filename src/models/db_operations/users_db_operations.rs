use crate::models::db_operations::DbError;
use crate::models::User;
use bcrypt::{hash, verify};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Account fields written at registration time.
#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub is_staff: bool,
}

/// Editable profile fields; `None` image fields leave the stored value alone.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileInput {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: Option<String>,
}

const USER_SELECT: &str = "SELECT u.id, u.username, u.first_name, u.last_name, u.email, u.is_staff, u.is_active,
        u.date_joined, u.last_login_time, pr.bio, pr.avatar
    FROM users u
    LEFT JOIN profiles pr ON pr.user_id = u.id";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        is_staff: row.get(5)?,
        is_active: row.get(6)?,
        date_joined: row.get(7)?,
        last_login_time: row.get(8)?,
        bio: row.get(9)?,
        avatar: row.get(10)?,
    })
}

pub fn hash_password(password: &str) -> Result<String, DbError> {
    Ok(hash(password, bcrypt::DEFAULT_COST)?)
}

/// Inserts the account and its profile row in one transaction.
pub fn insert_user(conn: &mut Connection, user: &NewUser, password_hash: &str) -> Result<i64, DbError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO users (username, password_hash, first_name, last_name, email, is_staff, date_joined)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![user.username, password_hash, user.first_name, user.last_name, user.email, user.is_staff, Utc::now()],
    )?;
    let user_id = tx.last_insert_rowid();
    tx.execute("INSERT INTO profiles (user_id) VALUES (?1)", [user_id])?;
    tx.commit()?;
    Ok(user_id)
}

pub fn create_user(conn: &mut Connection, user: &NewUser, password: &str) -> Result<i64, DbError> {
    let password_hash = hash_password(password)?;
    insert_user(conn, user, &password_hash)
}

pub fn read_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, DbError> {
    let sql = format!("{} WHERE u.username = ?1", USER_SELECT);
    Ok(conn.query_row(&sql, [username], user_from_row).optional()?)
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> Result<Option<User>, DbError> {
    let sql = format!("{} WHERE u.id = ?1", USER_SELECT);
    Ok(conn.query_row(&sql, [user_id], user_from_row).optional()?)
}

pub fn read_staff_users(conn: &Connection) -> Result<Vec<User>, DbError> {
    let sql = format!("{} WHERE u.is_staff = 1 ORDER BY u.username", USER_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], user_from_row)?;
    let mut users = Vec::new();
    for user in rows {
        users.push(user?);
    }
    Ok(users)
}

pub fn username_taken(conn: &Connection, username: &str, exclude_id: Option<i64>) -> Result<bool, DbError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 AND id != ?2)",
        params![username, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )?)
}

/// Returns the account only for an active user whose password matches.
pub fn verify_credentials(conn: &Connection, username: &str, password: &str) -> Option<User> {
    let res: rusqlite::Result<(String, bool)> = conn.query_row(
        "SELECT password_hash, is_active FROM users WHERE username = ?1",
        [username],
        |row| Ok((row.get(0)?, row.get(1)?)),
    );

    if let Ok((hash, is_active)) = res {
        if is_active && verify(password, &hash).unwrap_or(false) {
            return read_user_by_username(conn, username).ok().flatten();
        }
    }
    None
}

pub fn update_last_login_time(conn: &Connection, user_id: i64) -> Result<(), DbError> {
    conn.execute("UPDATE users SET last_login_time = ?1 WHERE id = ?2", params![Utc::now(), user_id])?;
    Ok(())
}

pub fn update_profile(
    conn: &mut Connection,
    user_id: i64,
    input: &ProfileInput,
    avatar: Option<Option<&str>>,
) -> Result<(), DbError> {
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE users SET username = ?1, first_name = ?2, last_name = ?3, email = ?4 WHERE id = ?5",
        params![input.username, input.first_name, input.last_name, input.email, user_id],
    )?;
    tx.execute(
        "INSERT INTO profiles (user_id, bio) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET bio = excluded.bio",
        params![user_id, input.bio],
    )?;
    if let Some(avatar) = avatar {
        tx.execute("UPDATE profiles SET avatar = ?1 WHERE user_id = ?2", params![avatar, user_id])?;
    }
    tx.commit()?;
    Ok(())
}

pub fn set_password(conn: &Connection, username: &str, password: &str) -> Result<usize, DbError> {
    let password_hash = hash_password(password)?;
    Ok(conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE username = ?2",
        params![password_hash, username],
    )?)
}

pub fn rename_staff_user(conn: &Connection, old_username: &str, new_username: &str) -> Result<usize, DbError> {
    Ok(conn.execute(
        "UPDATE users SET username = ?1 WHERE username = ?2 AND is_staff = 1",
        params![new_username, old_username],
    )?)
}

pub fn count_users(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count as u64)
}
