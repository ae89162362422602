use crate::helper::pagination::{Page, Paginator};
use crate::models::db_operations::{
    comments_db_operations, posts_db_operations, taxonomy_db_operations, users_db_operations, DbError,
};
use crate::models::{Category, Comment, PostCard, PostScope, User};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// One page of publicly visible posts in `scope`, newest first.
pub fn fetch_visible_page(
    conn: &Connection,
    now: DateTime<Utc>,
    scope: PostScope,
    per_page: u32,
    raw_page: Option<&str>,
) -> Result<Page<PostCard>, DbError> {
    let total = posts_db_operations::count_visible_posts(conn, now, scope)?;
    let info = Paginator::new(per_page, total).get_page(raw_page);
    let items = posts_db_operations::read_visible_posts(conn, now, scope, info.limit(), info.offset())?;
    Ok(Page { items, info })
}

/// `None` when the slug is unknown or the category is unpublished.
pub fn fetch_category_page(
    conn: &Connection,
    slug: &str,
    now: DateTime<Utc>,
    per_page: u32,
    raw_page: Option<&str>,
) -> Result<Option<(Category, Page<PostCard>)>, DbError> {
    let Some(category) = taxonomy_db_operations::read_published_category_by_slug(conn, slug)? else {
        return Ok(None);
    };
    let page = fetch_visible_page(conn, now, PostScope::Category(category.id), per_page, raw_page)?;
    Ok(Some((category, page)))
}

pub fn fetch_profile_page(
    conn: &Connection,
    username: &str,
    now: DateTime<Utc>,
    per_page: u32,
    raw_page: Option<&str>,
) -> Result<Option<(User, Page<PostCard>)>, DbError> {
    let Some(user) = users_db_operations::read_user_by_username(conn, username)? else {
        return Ok(None);
    };
    let page = fetch_visible_page(conn, now, PostScope::Author(user.id), per_page, raw_page)?;
    Ok(Some((user, page)))
}

/// A post and its comments, oldest first, if `viewer_id` may see it.
pub fn fetch_post_detail(
    conn: &Connection,
    post_id: i64,
    viewer_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Option<(PostCard, Vec<Comment>)>, DbError> {
    match posts_db_operations::read_post_card(conn, post_id)? {
        Some(post) if post.is_viewable_by(viewer_id, now) => {
            let comments = comments_db_operations::read_comments_for_post(conn, post.id)?;
            Ok(Some((post, comments)))
        }
        _ => Ok(None),
    }
}

/// Same gate as the detail page, without loading comments.
pub fn fetch_viewable_post(
    conn: &Connection,
    post_id: i64,
    viewer_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Option<PostCard>, DbError> {
    Ok(posts_db_operations::read_post_card(conn, post_id)?.filter(|post| post.is_viewable_by(viewer_id, now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::posts_db_operations::PostInput;
    use crate::setup::db_setup::test_support::{memory_db, seed_user};
    use chrono::Duration;

    fn post(conn: &Connection, author: i64, title: &str, offset_days: i64, published: bool, category: Option<i64>) -> i64 {
        let input = PostInput {
            title: title.into(),
            text: "text".into(),
            pub_date: Utc::now() + Duration::days(offset_days),
            is_published: published,
            location_id: None,
            category_id: category,
        };
        posts_db_operations::create_post(conn, author, &input, None).unwrap()
    }

    #[test]
    fn home_page_paginates_only_visible_posts() {
        let conn = memory_db();
        let alice = seed_user(&conn, "alice");
        for i in 0..12 {
            post(&conn, alice, &format!("p{}", i), -i - 1, true, None);
        }
        post(&conn, alice, "draft", -1, false, None);
        post(&conn, alice, "future", 3, true, None);

        let first = fetch_visible_page(&conn, Utc::now(), PostScope::All, 10, None).unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.info.total_count, 12);
        assert_eq!(first.items[0].title, "p0");

        let second = fetch_visible_page(&conn, Utc::now(), PostScope::All, 10, Some("2")).unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.items.iter().all(|p| p.title != "draft" && p.title != "future"));
    }

    #[test]
    fn unpublished_category_hides_page_and_posts() {
        let conn = memory_db();
        let alice = seed_user(&conn, "alice");
        let open = taxonomy_db_operations::create_category(&conn, "Open", "d", "open", true).unwrap();
        let hidden = taxonomy_db_operations::create_category(&conn, "Hidden", "d", "hidden", false).unwrap();
        post(&conn, alice, "in open", -1, true, Some(open));
        post(&conn, alice, "in hidden", -1, true, Some(hidden));

        let (category, page) = fetch_category_page(&conn, "open", Utc::now(), 10, None).unwrap().unwrap();
        assert_eq!(category.id, open);
        assert_eq!(page.items.len(), 1);
        assert!(fetch_category_page(&conn, "hidden", Utc::now(), 10, None).unwrap().is_none());
        assert!(fetch_category_page(&conn, "missing", Utc::now(), 10, None).unwrap().is_none());

        let home = fetch_visible_page(&conn, Utc::now(), PostScope::All, 10, None).unwrap();
        assert_eq!(home.items.len(), 1);
    }

    #[test]
    fn profile_lists_only_visible_posts_even_for_owner() {
        let conn = memory_db();
        let alice = seed_user(&conn, "alice");
        let bob = seed_user(&conn, "bob");
        post(&conn, alice, "public", -1, true, None);
        post(&conn, alice, "draft", -1, false, None);
        post(&conn, bob, "bob's", -1, true, None);

        let (user, page) = fetch_profile_page(&conn, "alice", Utc::now(), 10, None).unwrap().unwrap();
        assert_eq!(user.id, alice);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "public");
        assert!(fetch_profile_page(&conn, "nobody", Utc::now(), 10, None).unwrap().is_none());
    }

    #[test]
    fn author_alone_sees_own_draft_detail() {
        let conn = memory_db();
        let alice = seed_user(&conn, "alice");
        let bob = seed_user(&conn, "bob");
        let draft = post(&conn, alice, "draft", 2, false, None);
        comments_db_operations::create_comment(&conn, draft, alice, "note").unwrap();

        let (card, comments) = fetch_post_detail(&conn, draft, Some(alice), Utc::now()).unwrap().unwrap();
        assert_eq!(card.comment_count, 1);
        assert_eq!(comments.len(), 1);
        assert!(fetch_post_detail(&conn, draft, Some(bob), Utc::now()).unwrap().is_none());
        assert!(fetch_post_detail(&conn, draft, None, Utc::now()).unwrap().is_none());
        assert!(fetch_viewable_post(&conn, draft, None, Utc::now()).unwrap().is_none());
        assert!(fetch_viewable_post(&conn, draft, Some(alice), Utc::now()).unwrap().is_some());
    }
}
