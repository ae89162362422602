use crate::models::db_operations::{DbError, SqlArgs};
use crate::models::{AuthorRef, CategoryRef, LocationRef, Post, PostCard, PostScope};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Validated field values of a post, image aside.
#[derive(Debug, Clone, PartialEq)]
pub struct PostInput {
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageUpdate {
    Keep,
    Clear,
    Replace(String),
}

/// Optional admin-side narrowing of the post table.
#[derive(Debug, Default, Clone)]
pub struct PostFilter<'a> {
    pub title_contains: Option<&'a str>,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
}

/// Public listing predicate; `c` must be the LEFT JOINed category. Binds `now`.
pub const VISIBLE_POST_FILTER: &str =
    "p.is_published = 1 AND p.pub_date <= ? AND (p.category_id IS NULL OR c.is_published = 1)";

// The comment count is aggregated live so it can never drift from the comments table.
const POST_CARD_SELECT: &str = "SELECT p.id, p.title, p.text, p.image, p.pub_date, p.is_published, p.created_at,
        u.id, u.username,
        c.id, c.title, c.slug, c.is_published,
        l.id, l.name, l.is_published,
        (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN locations l ON l.id = p.location_id";

const NEWEST_FIRST: &str = " ORDER BY p.pub_date DESC, p.id DESC";

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        text: row.get(2)?,
        image: row.get(3)?,
        pub_date: row.get(4)?,
        is_published: row.get(5)?,
        created_at: row.get(6)?,
        author_id: row.get(7)?,
        location_id: row.get(8)?,
        category_id: row.get(9)?,
    })
}

fn post_card_from_row(row: &Row) -> rusqlite::Result<PostCard> {
    let category = match row.get::<_, Option<i64>>(9)? {
        Some(id) => Some(CategoryRef {
            id,
            title: row.get(10)?,
            slug: row.get(11)?,
            is_published: row.get(12)?,
        }),
        None => None,
    };
    let location = match row.get::<_, Option<i64>>(13)? {
        Some(id) => Some(LocationRef {
            id,
            name: row.get(14)?,
            is_published: row.get(15)?,
        }),
        None => None,
    };
    Ok(PostCard {
        id: row.get(0)?,
        title: row.get(1)?,
        text: row.get(2)?,
        image: row.get(3)?,
        pub_date: row.get(4)?,
        is_published: row.get(5)?,
        created_at: row.get(6)?,
        author: AuthorRef { id: row.get(7)?, username: row.get(8)? },
        category,
        location,
        comment_count: row.get(16)?,
    })
}

fn scope_clause(scope: &PostScope) -> (&'static str, Option<i64>) {
    match scope {
        PostScope::All => ("", None),
        PostScope::Category(id) => (" AND p.category_id = ?", Some(*id)),
        PostScope::Author(id) => (" AND p.author_id = ?", Some(*id)),
    }
}

fn filter_clause<'a>(filter: &'a PostFilter<'a>, pattern: &'a Option<String>) -> (String, SqlArgs<'a>) {
    let mut clauses = Vec::new();
    let mut args: SqlArgs<'a> = Vec::new();
    if let Some(pattern) = pattern {
        clauses.push("p.title LIKE ?");
        args.push(pattern);
    }
    if let Some(category_id) = &filter.category_id {
        clauses.push("p.category_id = ?");
        args.push(category_id);
    }
    if let Some(location_id) = &filter.location_id {
        clauses.push("p.location_id = ?");
        args.push(location_id);
    }
    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), args)
    }
}

fn like_pattern(filter: &PostFilter) -> Option<String> {
    filter
        .title_contains
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q))
}

pub fn create_post(
    conn: &Connection,
    author_id: i64,
    input: &PostInput,
    image: Option<&str>,
) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO posts (title, text, image, pub_date, is_published, created_at, author_id, location_id, category_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            input.title,
            input.text,
            image,
            input.pub_date,
            input.is_published,
            Utc::now(),
            author_id,
            input.location_id,
            input.category_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_post(conn: &Connection, post_id: i64) -> Result<Option<Post>, DbError> {
    Ok(conn
        .query_row(
            "SELECT id, title, text, image, pub_date, is_published, created_at, author_id, location_id, category_id
             FROM posts WHERE id = ?1",
            [post_id],
            post_from_row,
        )
        .optional()?)
}

pub fn read_post_card(conn: &Connection, post_id: i64) -> Result<Option<PostCard>, DbError> {
    let sql = format!("{} WHERE p.id = ?1", POST_CARD_SELECT);
    Ok(conn.query_row(&sql, [post_id], post_card_from_row).optional()?)
}

pub fn update_post(
    conn: &Connection,
    post_id: i64,
    input: &PostInput,
    image: &ImageUpdate,
) -> Result<usize, DbError> {
    let updated = match image {
        ImageUpdate::Keep => conn.execute(
            "UPDATE posts SET title = ?1, text = ?2, pub_date = ?3, is_published = ?4, location_id = ?5, category_id = ?6
             WHERE id = ?7",
            params![
                input.title,
                input.text,
                input.pub_date,
                input.is_published,
                input.location_id,
                input.category_id,
                post_id,
            ],
        )?,
        ImageUpdate::Clear | ImageUpdate::Replace(_) => {
            let new_image = match image {
                ImageUpdate::Replace(path) => Some(path.as_str()),
                _ => None,
            };
            conn.execute(
                "UPDATE posts SET title = ?1, text = ?2, pub_date = ?3, is_published = ?4, location_id = ?5, category_id = ?6, image = ?7
                 WHERE id = ?8",
                params![
                    input.title,
                    input.text,
                    input.pub_date,
                    input.is_published,
                    input.location_id,
                    input.category_id,
                    new_image,
                    post_id,
                ],
            )?
        }
    };
    Ok(updated)
}

/// Comments go with the post through `ON DELETE CASCADE`.
pub fn delete_post(conn: &Connection, post_id: i64) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [post_id])?)
}

pub fn count_visible_posts(conn: &Connection, now: DateTime<Utc>, scope: PostScope) -> Result<u64, DbError> {
    let (scope_sql, scope_id) = scope_clause(&scope);
    let sql = format!(
        "SELECT COUNT(*) FROM posts p LEFT JOIN categories c ON c.id = p.category_id WHERE {}{}",
        VISIBLE_POST_FILTER, scope_sql
    );
    let mut args: SqlArgs = vec![&now];
    if let Some(id) = &scope_id {
        args.push(id);
    }
    let count: i64 = conn.query_row(&sql, args.as_slice(), |row| row.get(0))?;
    Ok(count as u64)
}

/// Newest first by publication date.
pub fn read_visible_posts(
    conn: &Connection,
    now: DateTime<Utc>,
    scope: PostScope,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostCard>, DbError> {
    let (scope_sql, scope_id) = scope_clause(&scope);
    let sql = format!(
        "{} WHERE {}{}{} LIMIT ? OFFSET ?",
        POST_CARD_SELECT, VISIBLE_POST_FILTER, scope_sql, NEWEST_FIRST
    );
    let mut args: SqlArgs = vec![&now];
    if let Some(id) = &scope_id {
        args.push(id);
    }
    args.push(&limit);
    args.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args.as_slice(), post_card_from_row)?;
    let mut posts = Vec::new();
    for post in rows {
        posts.push(post?);
    }
    Ok(posts)
}

pub fn count_posts_matching(conn: &Connection, filter: &PostFilter) -> Result<u64, DbError> {
    let pattern = like_pattern(filter);
    let (where_sql, args) = filter_clause(filter, &pattern);
    let sql = format!("SELECT COUNT(*) FROM posts p{}", where_sql);
    let count: i64 = conn.query_row(&sql, args.as_slice(), |row| row.get(0))?;
    Ok(count as u64)
}

/// Every post regardless of visibility; used by the admin layer.
pub fn read_posts_matching(
    conn: &Connection,
    filter: &PostFilter,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostCard>, DbError> {
    let pattern = like_pattern(filter);
    let (where_sql, mut args) = filter_clause(filter, &pattern);
    let sql = format!("{}{}{} LIMIT ? OFFSET ?", POST_CARD_SELECT, where_sql, NEWEST_FIRST);
    args.push(&limit);
    args.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args.as_slice(), post_card_from_row)?;
    let mut posts = Vec::new();
    for post in rows {
        posts.push(post?);
    }
    Ok(posts)
}

pub fn update_post_listing_fields(
    conn: &Connection,
    post_id: i64,
    is_published: bool,
    category_id: Option<i64>,
    pub_date: DateTime<Utc>,
) -> Result<usize, DbError> {
    Ok(conn.execute(
        "UPDATE posts SET is_published = ?1, category_id = ?2, pub_date = ?3 WHERE id = ?4",
        params![is_published, category_id, pub_date, post_id],
    )?)
}
