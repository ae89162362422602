use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// A row of the `posts` table as stored.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub author_id: i64,
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AuthorRef {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CategoryRef {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub is_published: bool,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LocationRef {
    pub id: i64,
    pub name: String,
    pub is_published: bool,
}

/// A post joined with everything a listing or detail page shows.
#[derive(Debug, Serialize, Clone)]
pub struct PostCard {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub author: AuthorRef,
    pub category: Option<CategoryRef>,
    pub location: Option<LocationRef>,
    pub comment_count: i64,
}

impl PostCard {
    /// Rust twin of `posts_db_operations::VISIBLE_POST_FILTER`.
    pub fn is_publicly_visible(&self, now: DateTime<Utc>) -> bool {
        self.is_published
            && self.pub_date <= now
            && self.category.as_ref().map_or(true, |c| c.is_published)
    }

    /// Visible to everyone, or to its author regardless of publication state.
    pub fn is_viewable_by(&self, viewer_id: Option<i64>, now: DateTime<Utc>) -> bool {
        self.is_publicly_visible(now) || viewer_id == Some(self.author.id)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub post_id: i64,
    pub author: AuthorRef,
}

/// An account joined with its one-to-one profile row.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login_time: Option<DateTime<Utc>>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Anything carrying an author, so one ownership check covers every entity.
pub trait Authored {
    fn author_id(&self) -> i64;
}

impl Authored for Post {
    fn author_id(&self) -> i64 {
        self.author_id
    }
}

impl Authored for PostCard {
    fn author_id(&self) -> i64 {
        self.author.id
    }
}

impl Authored for Comment {
    fn author_id(&self) -> i64 {
        self.author.id
    }
}

impl Authored for User {
    fn author_id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success' or 'error'
}

/// Which slice of the post table a public listing covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PostScope {
    All,
    Category(i64),
    Author(i64),
}

pub mod db_operations;
