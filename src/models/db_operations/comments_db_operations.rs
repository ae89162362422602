use crate::models::db_operations::{DbError, SqlArgs};
use crate::models::{AuthorRef, Comment};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COMMENT_SELECT: &str = "SELECT cm.id, cm.text, cm.created_at, cm.post_id, u.id, u.username
    FROM comments cm
    JOIN users u ON u.id = cm.author_id";

fn comment_from_row(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        text: row.get(1)?,
        created_at: row.get(2)?,
        post_id: row.get(3)?,
        author: AuthorRef { id: row.get(4)?, username: row.get(5)? },
    })
}

pub fn create_comment(conn: &Connection, post_id: i64, author_id: i64, text: &str) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO comments (text, created_at, post_id, author_id) VALUES (?1, ?2, ?3, ?4)",
        params![text, Utc::now(), post_id, author_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Looks a comment up through its post, so a mismatched pair is simply not found.
pub fn read_comment(conn: &Connection, comment_id: i64, post_id: i64) -> Result<Option<Comment>, DbError> {
    let sql = format!("{} WHERE cm.id = ?1 AND cm.post_id = ?2", COMMENT_SELECT);
    Ok(conn.query_row(&sql, params![comment_id, post_id], comment_from_row).optional()?)
}

/// Oldest first.
pub fn read_comments_for_post(conn: &Connection, post_id: i64) -> Result<Vec<Comment>, DbError> {
    let sql = format!("{} WHERE cm.post_id = ?1 ORDER BY cm.created_at ASC, cm.id ASC", COMMENT_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([post_id], comment_from_row)?;
    let mut comments = Vec::new();
    for comment in rows {
        comments.push(comment?);
    }
    Ok(comments)
}

pub fn update_comment_text(conn: &Connection, comment_id: i64, text: &str) -> Result<usize, DbError> {
    Ok(conn.execute("UPDATE comments SET text = ?1 WHERE id = ?2", params![text, comment_id])?)
}

pub fn delete_comment(conn: &Connection, comment_id: i64) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM comments WHERE id = ?1", [comment_id])?)
}

pub fn count_comments_for_post(conn: &Connection, post_id: i64) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM comments WHERE post_id = ?1", [post_id], |row| row.get(0))?;
    Ok(count as u64)
}

fn search_clause(pattern: &Option<String>) -> (&'static str, SqlArgs<'_>) {
    match pattern {
        Some(p) => (" WHERE cm.text LIKE ?", vec![p as &dyn rusqlite::ToSql]),
        None => ("", Vec::new()),
    }
}

fn text_pattern(text_contains: Option<&str>) -> Option<String> {
    text_contains.map(str::trim).filter(|q| !q.is_empty()).map(|q| format!("%{}%", q))
}

pub fn count_comments_matching(conn: &Connection, text_contains: Option<&str>) -> Result<u64, DbError> {
    let pattern = text_pattern(text_contains);
    let (where_sql, args) = search_clause(&pattern);
    let sql = format!("SELECT COUNT(*) FROM comments cm{}", where_sql);
    let count: i64 = conn.query_row(&sql, args.as_slice(), |row| row.get(0))?;
    Ok(count as u64)
}

/// Newest first, for the admin changelist.
pub fn read_comments_matching(
    conn: &Connection,
    text_contains: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<Comment>, DbError> {
    let pattern = text_pattern(text_contains);
    let (where_sql, mut args) = search_clause(&pattern);
    let sql = format!("{}{} ORDER BY cm.created_at DESC, cm.id DESC LIMIT ? OFFSET ?", COMMENT_SELECT, where_sql);
    args.push(&limit);
    args.push(&offset);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args.as_slice(), comment_from_row)?;
    let mut comments = Vec::new();
    for comment in rows {
        comments.push(comment?);
    }
    Ok(comments)
}
