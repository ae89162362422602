#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use blogicum_backend::models::db_operations::{comments_db_operations, posts_db_operations};
use common::{
    csrf_token_in, files_under, location, multipart_body, seed_account, seed_category, seed_comment, seed_post,
    test_config, test_pool, Browser, Part,
};
use std::path::Path;

fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

#[actix_web::test]
async fn home_page_lists_only_visible_posts() {
    let pool = test_pool();
    let author = seed_account(&pool, "leo", false);
    let open = seed_category(&pool, "travel", true);
    let hidden = seed_category(&pool, "drafts", false);
    seed_post(&pool, author, "Visible story", Some(open), true, -1);
    seed_post(&pool, author, "Scheduled story", Some(open), true, 48);
    seed_post(&pool, author, "Unpublished story", Some(open), false, -1);
    seed_post(&pool, author, "Story in hidden category", Some(hidden), true, -1);
    let app = init_site!(test_config(), pool);

    let resp = test::call_service(&app, TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(&test::read_body(resp).await);
    assert!(body.contains("Visible story"));
    assert!(!body.contains("Scheduled story"));
    assert!(!body.contains("Unpublished story"));
    assert!(!body.contains("Story in hidden category"));
}

#[actix_web::test]
async fn unknown_paths_render_the_not_found_page() {
    let app = init_site!(test_config(), test_pool());

    let resp = test::call_service(&app, TestRequest::get().uri("/no/such/page").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_text(&test::read_body(resp).await);
    assert!(body.contains("Page not found"));
}

#[actix_web::test]
async fn unpublished_category_is_not_found() {
    let pool = test_pool();
    seed_category(&pool, "drafts", false);
    seed_category(&pool, "travel", true);
    let app = init_site!(test_config(), pool);

    let resp = test::call_service(&app, TestRequest::get().uri("/category/drafts").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = test::call_service(&app, TestRequest::get().uri("/category/travel").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn static_pages_render() {
    let app = init_site!(test_config(), test_pool());

    for uri in ["/pages/about", "/pages/rules"] {
        let resp = test::call_service(&app, TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
    }
}

#[actix_web::test]
async fn anonymous_post_form_redirects_to_login_with_next() {
    let app = init_site!(test_config(), test_pool());

    let resp = test::call_service(&app, TestRequest::get().uri("/posts/create").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/auth/login?next=%2Fposts%2Fcreate");
}

#[actix_web::test]
async fn login_lands_on_profile_and_unlocks_post_form() {
    let pool = test_pool();
    seed_account(&pool, "leo", false);
    let app = init_site!(test_config(), pool);
    let mut browser = Browser::default();

    let resp = login!(app, browser, "leo");
    assert_eq!(location(&resp), "/profile/leo");

    let resp = test::call_service(&app, browser.request(TestRequest::get().uri("/posts/create")).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn login_with_forged_token_is_rejected() {
    let pool = test_pool();
    seed_account(&pool, "leo", false);
    let app = init_site!(test_config(), pool);
    let mut browser = Browser::default();

    let resp = test::call_service(&app, browser.request(TestRequest::get().uri("/auth/login")).to_request()).await;
    browser.absorb(&resp);
    let resp = test::call_service(
        &app,
        browser
            .request(TestRequest::post().uri("/auth/login"))
            .set_form([("csrf_token", "forged"), ("username", "leo"), ("password", common::PASSWORD), ("next", "")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn hidden_post_is_visible_to_its_author_only() {
    let pool = test_pool();
    let author = seed_account(&pool, "leo", false);
    seed_account(&pool, "mia", false);
    let post_id = seed_post(&pool, author, "Draft", None, false, -1);
    let app = init_site!(test_config(), pool);
    let uri = format!("/posts/{}", post_id);

    let resp = test::call_service(&app, TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mut stranger = Browser::default();
    login!(app, stranger, "mia");
    let resp = test::call_service(&app, stranger.request(TestRequest::get().uri(&uri)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mut owner = Browser::default();
    login!(app, owner, "leo");
    let resp = test::call_service(&app, owner.request(TestRequest::get().uri(&uri)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn non_author_is_sent_back_to_the_post() {
    let pool = test_pool();
    let author = seed_account(&pool, "leo", false);
    seed_account(&pool, "mia", false);
    let post_id = seed_post(&pool, author, "Leo's post", None, true, -1);
    let app = init_site!(test_config(), pool);
    let mut browser = Browser::default();
    login!(app, browser, "mia");

    for action in ["edit", "delete"] {
        let uri = format!("/posts/{}/{}", post_id, action);
        let resp = test::call_service(&app, browser.request(TestRequest::get().uri(&uri)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{}", uri);
        assert_eq!(location(&resp), format!("/posts/{}", post_id));
    }

    let resp = test::call_service(&app, browser.request(TestRequest::get().uri("/posts/999/edit")).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn non_author_submissions_leave_post_and_comment_untouched() {
    let pool = test_pool();
    let author = seed_account(&pool, "leo", false);
    seed_account(&pool, "mia", false);
    let post_id = seed_post(&pool, author, "Leo's post", None, true, -1);
    let comment_id = seed_comment(&pool, post_id, author, "Leo's comment");
    let app = init_site!(test_config(), pool.clone());
    let mut browser = Browser::default();
    login!(app, browser, "mia");
    let post_uri = format!("/posts/{}", post_id);

    let resp = test::call_service(&app, browser.request(TestRequest::get().uri(&post_uri)).to_request()).await;
    browser.absorb(&resp);
    let token = csrf_token_in(&test::read_body(resp).await);

    let (content_type, body) = multipart_body(&[
        Part::Text("csrf_token", &token),
        Part::Text("title", "Hijacked"),
        Part::Text("text", "Hijacked text"),
        Part::Text("pub_date", ""),
    ]);
    let resp = test::call_service(
        &app,
        browser
            .request(TestRequest::post().uri(&format!("{}/edit", post_uri)))
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), post_uri);

    let form_posts = [
        (format!("{}/edit_comment/{}", post_uri, comment_id), vec![("csrf_token", token.as_str()), ("text", "Hijacked")]),
        (format!("{}/delete_comment/{}", post_uri, comment_id), vec![("csrf_token", token.as_str())]),
        (format!("{}/delete", post_uri), vec![("csrf_token", token.as_str())]),
    ];
    for (uri, form) in form_posts {
        let resp =
            test::call_service(&app, browser.request(TestRequest::post().uri(&uri)).set_form(form).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{}", uri);
        assert_eq!(location(&resp), post_uri, "{}", uri);
    }

    let conn = pool.get().unwrap();
    let post = posts_db_operations::read_post(&conn, post_id).unwrap().expect("post survives");
    assert_eq!(post.title, "Leo's post");
    assert_eq!(post.text, "Leo's post body text");
    let comment = comments_db_operations::read_comment(&conn, comment_id, post_id)
        .unwrap()
        .expect("comment survives");
    assert_eq!(comment.text, "Leo's comment");
}

#[actix_web::test]
async fn post_form_with_unknown_category_is_redisplayed_without_saving() {
    let pool = test_pool();
    seed_account(&pool, "leo", false);
    seed_category(&pool, "travel", true);
    let config = test_config();
    let media_root = config.media_path.clone();
    let app = init_site!(config, pool.clone());
    let mut browser = Browser::default();
    login!(app, browser, "leo");

    let resp = test::call_service(&app, browser.request(TestRequest::get().uri("/posts/create")).to_request()).await;
    browser.absorb(&resp);
    let token = csrf_token_in(&test::read_body(resp).await);

    let png = b"\x89PNG\r\n\x1a\n not really pixels";
    let (content_type, body) = multipart_body(&[
        Part::Text("csrf_token", &token),
        Part::Text("title", "Trip notes"),
        Part::Text("text", "Went places"),
        Part::Text("pub_date", ""),
        Part::Text("category", "999"),
        Part::Text("location", ""),
        Part::Text("is_published", "on"),
        Part::File { name: "image", filename: "cover.png", content_type: "image/png", bytes: png },
    ]);
    let resp = test::call_service(
        &app,
        browser
            .request(TestRequest::post().uri("/posts/create"))
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = body_text(&test::read_body(resp).await);
    assert!(page.contains("Select a valid choice."));
    assert!(page.contains("Trip notes"));

    let conn = pool.get().unwrap();
    let stored: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0)).unwrap();
    assert_eq!(stored, 0);
    drop(conn);
    assert_eq!(files_under(Path::new(&media_root)), 0);
}

#[actix_web::test]
async fn comment_is_added_and_shown_on_the_post() {
    let pool = test_pool();
    let author = seed_account(&pool, "leo", false);
    seed_account(&pool, "mia", false);
    let post_id = seed_post(&pool, author, "Open for comments", None, true, -1);
    let app = init_site!(test_config(), pool);
    let mut browser = Browser::default();
    login!(app, browser, "mia");
    let uri = format!("/posts/{}", post_id);

    let resp = test::call_service(&app, browser.request(TestRequest::get().uri(&uri)).to_request()).await;
    browser.absorb(&resp);
    let token = csrf_token_in(&test::read_body(resp).await);

    let resp = test::call_service(
        &app,
        browser
            .request(TestRequest::post().uri(&format!("{}/comment", uri)))
            .set_form([("csrf_token", token.as_str()), ("text", "Lovely <b>read</b>")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), uri);

    let resp = test::call_service(&app, browser.request(TestRequest::get().uri(&uri)).to_request()).await;
    let body = body_text(&test::read_body(resp).await);
    assert!(body.contains("Lovely &lt;b&gt;read"));
    assert!(!body.contains("<b>read</b>"));
    assert!(body.contains("Comments (1)"));
}

#[actix_web::test]
async fn admin_area_is_hidden_from_non_staff() {
    let pool = test_pool();
    seed_account(&pool, "leo", false);
    seed_account(&pool, "boss", true);
    let config = test_config();
    let dashboard = format!("{}/dashboard", config.admin_root());
    let app = init_site!(config, pool);

    let resp = test::call_service(&app, TestRequest::get().uri(&dashboard).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mut user = Browser::default();
    login!(app, user, "leo");
    let resp = test::call_service(&app, user.request(TestRequest::get().uri(&dashboard)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mut staff = Browser::default();
    login!(app, staff, "boss");
    let resp = test::call_service(&app, staff.request(TestRequest::get().uri(&dashboard)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(&test::read_body(resp).await);
    assert!(body.contains("Site administration"));
}

#[actix_web::test]
async fn profile_page_is_public_and_edit_is_owner_only() {
    let pool = test_pool();
    let author = seed_account(&pool, "leo", false);
    seed_account(&pool, "mia", false);
    seed_post(&pool, author, "Leo writes", None, true, -1);
    let app = init_site!(test_config(), pool);

    let resp = test::call_service(&app, TestRequest::get().uri("/profile/leo").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(&test::read_body(resp).await).contains("Leo writes"));

    let resp = test::call_service(&app, TestRequest::get().uri("/profile/nobody").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mut browser = Browser::default();
    login!(app, browser, "mia");
    let resp = test::call_service(&app, browser.request(TestRequest::get().uri("/profile/leo/edit")).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/profile/leo");
}
