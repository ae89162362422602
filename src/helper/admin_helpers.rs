use crate::helper::form_helpers::{self, FormErrors};
use crate::helper::pagination::{PageInfo, Paginator};
use crate::models::db_operations::posts_db_operations::{self, PostFilter};
use crate::models::db_operations::{comments_db_operations, taxonomy_db_operations, users_db_operations, DbError};
use crate::models::{Category, Location, PostCard};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdminHelperError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Unknown admin model: {0}")]
    UnknownModel(String),
}

/// How one model is presented in the management interface.
#[derive(Debug, Serialize, PartialEq)]
pub struct ModelAdmin {
    pub key: &'static str,
    pub verbose_name: &'static str,
    pub verbose_name_plural: &'static str,
    pub list_display: &'static [&'static str],
    pub search_fields: &'static [&'static str],
    pub list_filter: &'static [&'static str],
    pub list_editable: &'static [&'static str],
    /// Whether rows open a change form; posts and comments are only listed and deleted.
    pub has_change_form: bool,
}

pub static MODEL_ADMINS: [ModelAdmin; 4] = [
    ModelAdmin {
        key: "post",
        verbose_name: "post",
        verbose_name_plural: "posts",
        list_display: &["title", "text", "pub_date", "author", "location", "category", "is_published", "created_at"],
        search_fields: &["title"],
        list_filter: &["category"],
        list_editable: &["is_published", "category", "pub_date"],
        has_change_form: false,
    },
    ModelAdmin {
        key: "category",
        verbose_name: "category",
        verbose_name_plural: "categories",
        list_display: &["title", "slug", "is_published", "posts", "created_at"],
        search_fields: &["title"],
        list_filter: &[],
        list_editable: &[],
        has_change_form: true,
    },
    ModelAdmin {
        key: "location",
        verbose_name: "location",
        verbose_name_plural: "locations",
        list_display: &["name", "is_published", "posts", "created_at"],
        search_fields: &["name"],
        list_filter: &[],
        list_editable: &[],
        has_change_form: true,
    },
    ModelAdmin {
        key: "comment",
        verbose_name: "comment",
        verbose_name_plural: "comments",
        list_display: &["text", "author", "post", "created_at"],
        search_fields: &["text"],
        list_filter: &[],
        list_editable: &[],
        has_change_form: false,
    },
];

pub fn find_model_admin(key: &str) -> Result<&'static ModelAdmin, AdminHelperError> {
    MODEL_ADMINS
        .iter()
        .find(|admin| admin.key == key)
        .ok_or_else(|| AdminHelperError::UnknownModel(key.to_string()))
}

#[derive(Debug, Serialize)]
pub struct DashboardEntry {
    pub admin: &'static ModelAdmin,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub entries: Vec<DashboardEntry>,
    pub user_count: u64,
}

pub fn build_dashboard(conn: &Connection) -> Result<Dashboard, AdminHelperError> {
    let mut entries = Vec::with_capacity(MODEL_ADMINS.len());
    for admin in MODEL_ADMINS.iter() {
        let count = match admin.key {
            "post" => posts_db_operations::count_posts_matching(conn, &PostFilter::default())?,
            "category" => taxonomy_db_operations::count_categories_matching(conn, None)?,
            "location" => taxonomy_db_operations::count_locations_matching(conn, None)?,
            _ => comments_db_operations::count_comments_matching(conn, None)?,
        };
        entries.push(DashboardEntry { admin, count });
    }
    Ok(Dashboard { entries, user_count: users_db_operations::count_users(conn)? })
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ChangelistCell {
    pub column: &'static str,
    pub value: String,
    pub editable: bool,
}

#[derive(Debug, Serialize)]
pub struct ChangelistRow {
    pub id: i64,
    pub cells: Vec<ChangelistCell>,
}

#[derive(Debug, Serialize)]
pub struct Changelist {
    pub admin: &'static ModelAdmin,
    pub rows: Vec<ChangelistRow>,
    pub page: PageInfo,
    pub q: String,
    pub category_filter: Option<i64>,
    /// Choices for the category filter and the inline category select.
    pub categories: Vec<Category>,
}

/// Shortens long text columns to `max` characters, ending in an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}

fn display_time(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M").to_string()
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn post_row(admin: &ModelAdmin, post: PostCard) -> ChangelistRow {
    let cells = admin
        .list_display
        .iter()
        .map(|&column| {
            let editable = admin.list_editable.contains(&column);
            let value = match column {
                "title" => post.title.clone(),
                "text" => truncate_chars(&post.text, 50),
                "pub_date" if editable => form_helpers::format_datetime_local(post.pub_date),
                "pub_date" => display_time(post.pub_date),
                "author" => post.author.username.clone(),
                "location" => post.location.as_ref().map(|l| l.name.clone()).unwrap_or_default(),
                "category" if editable => post.category.as_ref().map(|c| c.id.to_string()).unwrap_or_default(),
                "category" => post.category.as_ref().map(|c| c.title.clone()).unwrap_or_default(),
                "is_published" if editable => post.is_published.to_string(),
                "is_published" => yes_no(post.is_published),
                "created_at" => display_time(post.created_at),
                _ => String::new(),
            };
            ChangelistCell { column, value, editable }
        })
        .collect();
    ChangelistRow { id: post.id, cells }
}

fn simple_row(id: i64, admin: &ModelAdmin, lookup: impl Fn(&str) -> String) -> ChangelistRow {
    let cells = admin
        .list_display
        .iter()
        .map(|&column| ChangelistCell { column, value: lookup(column), editable: false })
        .collect();
    ChangelistRow { id, cells }
}

/// A filtered, searched and paginated listing of one model.
pub fn build_changelist(
    conn: &Connection,
    admin: &'static ModelAdmin,
    q: Option<&str>,
    category_filter: Option<i64>,
    per_page: u32,
    raw_page: Option<&str>,
) -> Result<Changelist, AdminHelperError> {
    let q = q.map(str::trim).filter(|q| !q.is_empty());
    let category_filter = category_filter.filter(|_| admin.list_filter.contains(&"category"));

    let (page, rows) = match admin.key {
        "post" => {
            let filter = PostFilter { title_contains: q, category_id: category_filter, location_id: None };
            let total = posts_db_operations::count_posts_matching(conn, &filter)?;
            let page = Paginator::new(per_page, total).get_page(raw_page);
            let rows = posts_db_operations::read_posts_matching(conn, &filter, page.limit(), page.offset())?
                .into_iter()
                .map(|post| post_row(admin, post))
                .collect();
            (page, rows)
        }
        "category" => {
            let total = taxonomy_db_operations::count_categories_matching(conn, q)?;
            let page = Paginator::new(per_page, total).get_page(raw_page);
            let mut rows = Vec::new();
            for category in taxonomy_db_operations::read_categories_matching(conn, q, page.limit(), page.offset())? {
                let posts = taxonomy_db_operations::count_posts_in_category(conn, category.id)?;
                rows.push(simple_row(category.id, admin, |column| match column {
                    "title" => category.title.clone(),
                    "slug" => category.slug.clone(),
                    "is_published" => yes_no(category.is_published),
                    "posts" => posts.to_string(),
                    "created_at" => display_time(category.created_at),
                    _ => String::new(),
                }));
            }
            (page, rows)
        }
        "location" => {
            let total = taxonomy_db_operations::count_locations_matching(conn, q)?;
            let page = Paginator::new(per_page, total).get_page(raw_page);
            let mut rows = Vec::new();
            for location in taxonomy_db_operations::read_locations_matching(conn, q, page.limit(), page.offset())? {
                let posts = taxonomy_db_operations::count_posts_at_location(conn, location.id)?;
                rows.push(simple_row(location.id, admin, |column| match column {
                    "name" => location.name.clone(),
                    "is_published" => yes_no(location.is_published),
                    "posts" => posts.to_string(),
                    "created_at" => display_time(location.created_at),
                    _ => String::new(),
                }));
            }
            (page, rows)
        }
        "comment" => {
            let total = comments_db_operations::count_comments_matching(conn, q)?;
            let page = Paginator::new(per_page, total).get_page(raw_page);
            let rows = comments_db_operations::read_comments_matching(conn, q, page.limit(), page.offset())?
                .into_iter()
                .map(|comment| {
                    simple_row(comment.id, admin, |column| match column {
                        "text" => truncate_chars(&comment.text, 50),
                        "author" => comment.author.username.clone(),
                        "post" => format!("#{}", comment.post_id),
                        "created_at" => display_time(comment.created_at),
                        _ => String::new(),
                    })
                })
                .collect();
            (page, rows)
        }
        other => return Err(AdminHelperError::UnknownModel(other.to_string())),
    };

    let categories = if admin.key == "post" {
        taxonomy_db_operations::read_all_categories(conn)?
    } else {
        Vec::new()
    };

    Ok(Changelist {
        admin,
        rows,
        page,
        q: q.unwrap_or_default().to_string(),
        category_filter,
        categories,
    })
}

/// Submitted values of the inline-editable post columns.
#[derive(Debug, Clone, Default)]
pub struct PostQuickEdit {
    pub is_published: bool,
    pub category: String,
    pub pub_date: String,
}

/// Applies the inline-editable post columns. `Ok(false)` means no such post.
pub fn apply_post_quick_edit(
    conn: &Connection,
    post_id: i64,
    edit: &PostQuickEdit,
) -> Result<Result<bool, FormErrors>, AdminHelperError> {
    let mut errors = FormErrors::default();
    let categories = taxonomy_db_operations::read_all_categories(conn)?;

    let category_id = match edit.category.trim() {
        "" => None,
        raw => match raw.parse::<i64>() {
            Ok(id) if categories.iter().any(|c| c.id == id) => Some(id),
            _ => {
                errors.add("category", "Select a valid choice.");
                None
            }
        },
    };
    let pub_date = form_helpers::parse_datetime_local(&edit.pub_date);
    if pub_date.is_none() {
        errors.add("pub_date", "Enter a valid date/time.");
    }

    match pub_date {
        Some(pub_date) if errors.is_empty() => {
            let updated = posts_db_operations::update_post_listing_fields(conn, post_id, edit.is_published, category_id, pub_date)?;
            Ok(Ok(updated > 0))
        }
        _ => Ok(Err(errors)),
    }
}

/// Posts attached to a category or location, shown inline on its edit page.
pub fn posts_attached_to(
    conn: &Connection,
    category: Option<&Category>,
    location: Option<&Location>,
) -> Result<Vec<PostCard>, AdminHelperError> {
    let filter = PostFilter {
        title_contains: None,
        category_id: category.map(|c| c.id),
        location_id: location.map(|l| l.id),
    };
    Ok(posts_db_operations::read_posts_matching(conn, &filter, u32::MAX, 0)?)
}
