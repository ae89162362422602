use crate::models::db_operations::{comments_db_operations, posts_db_operations, DbError};
use crate::models::{Authored, Comment, Post};
use rusqlite::Connection;

/// Outcome of the author check that guards every edit and delete.
#[derive(Debug, PartialEq)]
pub enum Ownership<T> {
    Missing,
    NotOwner(T),
    Owner(T),
}

pub fn check_ownership<T: Authored>(entity: Option<T>, requester_id: i64) -> Ownership<T> {
    match entity {
        None => Ownership::Missing,
        Some(e) if e.author_id() == requester_id => Ownership::Owner(e),
        Some(e) => Ownership::NotOwner(e),
    }
}

pub fn post_for_author(conn: &Connection, post_id: i64, requester_id: i64) -> Result<Ownership<Post>, DbError> {
    Ok(check_ownership(posts_db_operations::read_post(conn, post_id)?, requester_id))
}

/// A comment addressed through the wrong post counts as missing.
pub fn comment_for_author(
    conn: &Connection,
    post_id: i64,
    comment_id: i64,
    requester_id: i64,
) -> Result<Ownership<Comment>, DbError> {
    Ok(check_ownership(
        comments_db_operations::read_comment(conn, comment_id, post_id)?,
        requester_id,
    ))
}
