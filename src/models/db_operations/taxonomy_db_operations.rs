use crate::models::db_operations::{DbError, SqlArgs};
use crate::models::{Category, Location};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

const CATEGORY_SELECT: &str = "SELECT id, title, description, slug, is_published, created_at FROM categories";
const LOCATION_SELECT: &str = "SELECT id, name, is_published, created_at FROM locations";

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        slug: row.get(3)?,
        is_published: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn location_from_row(row: &Row) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get(0)?,
        name: row.get(1)?,
        is_published: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn collect<T>(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql], map: fn(&Row) -> rusqlite::Result<T>) -> Result<Vec<T>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, map)?;
    let mut items = Vec::new();
    for item in rows {
        items.push(item?);
    }
    Ok(items)
}

fn like(query: Option<&str>) -> Option<String> {
    query.map(str::trim).filter(|q| !q.is_empty()).map(|q| format!("%{}%", q))
}

// --- Categories ---

pub fn create_category(
    conn: &Connection,
    title: &str,
    description: &str,
    slug: &str,
    is_published: bool,
) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO categories (title, description, slug, is_published, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![title, description, slug, is_published, Utc::now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_category(
    conn: &Connection,
    category_id: i64,
    title: &str,
    description: &str,
    slug: &str,
    is_published: bool,
) -> Result<usize, DbError> {
    Ok(conn.execute(
        "UPDATE categories SET title = ?1, description = ?2, slug = ?3, is_published = ?4 WHERE id = ?5",
        params![title, description, slug, is_published, category_id],
    )?)
}

/// Dependent posts keep existing with `category_id` set to NULL.
pub fn delete_category(conn: &Connection, category_id: i64) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM categories WHERE id = ?1", [category_id])?)
}

pub fn read_category(conn: &Connection, category_id: i64) -> Result<Option<Category>, DbError> {
    let sql = format!("{} WHERE id = ?1", CATEGORY_SELECT);
    Ok(conn.query_row(&sql, [category_id], category_from_row).optional()?)
}

/// Category pages only exist for published categories.
pub fn read_published_category_by_slug(conn: &Connection, slug: &str) -> Result<Option<Category>, DbError> {
    let sql = format!("{} WHERE slug = ?1 AND is_published = 1", CATEGORY_SELECT);
    Ok(conn.query_row(&sql, [slug], category_from_row).optional()?)
}

pub fn slug_taken(conn: &Connection, slug: &str, exclude_id: Option<i64>) -> Result<bool, DbError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE slug = ?1 AND id != ?2)",
        params![slug, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )?)
}

pub fn read_all_categories(conn: &Connection) -> Result<Vec<Category>, DbError> {
    collect(conn, &format!("{} ORDER BY title, id", CATEGORY_SELECT), &[], category_from_row)
}

pub fn count_categories_matching(conn: &Connection, title_contains: Option<&str>) -> Result<u64, DbError> {
    let pattern = like(title_contains);
    let (sql, args): (String, SqlArgs) = match &pattern {
        Some(p) => ("SELECT COUNT(*) FROM categories WHERE title LIKE ?".into(), vec![p as &dyn rusqlite::ToSql]),
        None => ("SELECT COUNT(*) FROM categories".into(), Vec::new()),
    };
    let count: i64 = conn.query_row(&sql, args.as_slice(), |row| row.get(0))?;
    Ok(count as u64)
}

pub fn read_categories_matching(
    conn: &Connection,
    title_contains: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<Category>, DbError> {
    let pattern = like(title_contains);
    let mut args: SqlArgs = Vec::new();
    let mut sql = CATEGORY_SELECT.to_string();
    if let Some(p) = &pattern {
        sql.push_str(" WHERE title LIKE ?");
        args.push(p);
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
    args.push(&limit);
    args.push(&offset);
    collect(conn, &sql, args.as_slice(), category_from_row)
}

// --- Locations ---

pub fn create_location(conn: &Connection, name: &str, is_published: bool) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO locations (name, is_published, created_at) VALUES (?1, ?2, ?3)",
        params![name, is_published, Utc::now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_location(conn: &Connection, location_id: i64, name: &str, is_published: bool) -> Result<usize, DbError> {
    Ok(conn.execute(
        "UPDATE locations SET name = ?1, is_published = ?2 WHERE id = ?3",
        params![name, is_published, location_id],
    )?)
}

/// Dependent posts keep existing with `location_id` set to NULL.
pub fn delete_location(conn: &Connection, location_id: i64) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM locations WHERE id = ?1", [location_id])?)
}

pub fn read_location(conn: &Connection, location_id: i64) -> Result<Option<Location>, DbError> {
    let sql = format!("{} WHERE id = ?1", LOCATION_SELECT);
    Ok(conn.query_row(&sql, [location_id], location_from_row).optional()?)
}

pub fn location_name_taken(conn: &Connection, name: &str, exclude_id: Option<i64>) -> Result<bool, DbError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM locations WHERE name = ?1 AND id != ?2)",
        params![name, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )?)
}

pub fn read_all_locations(conn: &Connection) -> Result<Vec<Location>, DbError> {
    collect(conn, &format!("{} ORDER BY name, id", LOCATION_SELECT), &[], location_from_row)
}

pub fn count_locations_matching(conn: &Connection, name_contains: Option<&str>) -> Result<u64, DbError> {
    let pattern = like(name_contains);
    let (sql, args): (String, SqlArgs) = match &pattern {
        Some(p) => ("SELECT COUNT(*) FROM locations WHERE name LIKE ?".into(), vec![p as &dyn rusqlite::ToSql]),
        None => ("SELECT COUNT(*) FROM locations".into(), Vec::new()),
    };
    let count: i64 = conn.query_row(&sql, args.as_slice(), |row| row.get(0))?;
    Ok(count as u64)
}

pub fn read_locations_matching(
    conn: &Connection,
    name_contains: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<Location>, DbError> {
    let pattern = like(name_contains);
    let mut args: SqlArgs = Vec::new();
    let mut sql = LOCATION_SELECT.to_string();
    if let Some(p) = &pattern {
        sql.push_str(" WHERE name LIKE ?");
        args.push(p);
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
    args.push(&limit);
    args.push(&offset);
    collect(conn, &sql, args.as_slice(), location_from_row)
}

/// Number of posts attached to a category or location, for admin columns.
pub fn count_posts_in_category(conn: &Connection, category_id: i64) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts WHERE category_id = ?1", [category_id], |row| row.get(0))?;
    Ok(count as u64)
}

pub fn count_posts_at_location(conn: &Connection, location_id: i64) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts WHERE location_id = ?1", [location_id], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::test_support::memory_db;

    #[test]
    fn unpublished_category_has_no_page() {
        let conn = memory_db();
        create_category(&conn, "Travel", "Trips", "travel", true).unwrap();
        create_category(&conn, "Drafts", "", "drafts", false).unwrap();

        assert!(read_published_category_by_slug(&conn, "travel").unwrap().is_some());
        assert!(read_published_category_by_slug(&conn, "drafts").unwrap().is_none());
        assert!(read_published_category_by_slug(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn slug_and_location_name_are_unique() {
        let conn = memory_db();
        let id = create_category(&conn, "Travel", "", "travel", true).unwrap();
        assert!(create_category(&conn, "Travel again", "", "travel", true).is_err());
        assert!(slug_taken(&conn, "travel", None).unwrap());
        assert!(!slug_taken(&conn, "travel", Some(id)).unwrap());

        let loc = create_location(&conn, "Kazan", true).unwrap();
        assert!(create_location(&conn, "Kazan", false).is_err());
        assert!(location_name_taken(&conn, "Kazan", None).unwrap());
        assert!(!location_name_taken(&conn, "Kazan", Some(loc)).unwrap());
    }

    #[test]
    fn update_and_search_categories() {
        let conn = memory_db();
        let id = create_category(&conn, "Food", "", "food", true).unwrap();
        create_category(&conn, "Sport", "", "sport", true).unwrap();
        update_category(&conn, id, "Street food", "Cheap eats", "street-food", false).unwrap();

        let category = read_category(&conn, id).unwrap().unwrap();
        assert_eq!(category.slug, "street-food");
        assert!(!category.is_published);
        assert_eq!(count_categories_matching(&conn, Some("food")).unwrap(), 1);
        assert_eq!(read_categories_matching(&conn, None, 1, 0).unwrap().len(), 1);
        assert_eq!(read_all_categories(&conn).unwrap().len(), 2);
    }

    #[test]
    fn locations_search_and_update() {
        let conn = memory_db();
        let id = create_location(&conn, "Saint Petersburg", true).unwrap();
        create_location(&conn, "Sochi", true).unwrap();
        update_location(&conn, id, "St. Petersburg", false).unwrap();

        assert_eq!(read_location(&conn, id).unwrap().unwrap().name, "St. Petersburg");
        assert_eq!(count_locations_matching(&conn, Some("so")).unwrap(), 1);
        assert_eq!(read_locations_matching(&conn, Some("St."), 10, 0).unwrap().len(), 1);
        assert_eq!(read_all_locations(&conn).unwrap().len(), 2);
        assert_eq!(delete_location(&conn, id).unwrap(), 1);
        assert!(read_location(&conn, id).unwrap().is_none());
    }
}
