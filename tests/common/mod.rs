#![allow(dead_code)]

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::test::TestRequest;
use blogicum_backend::config::{BlogConfig, Config, WebConfig};
use blogicum_backend::models::db_operations::comments_db_operations;
use blogicum_backend::models::db_operations::posts_db_operations::{self, PostInput};
use blogicum_backend::models::db_operations::taxonomy_db_operations;
use blogicum_backend::models::db_operations::users_db_operations::{self, NewUser};
use blogicum_backend::setup::db_setup;
use blogicum_backend::{open_memory_pool, DbPool};
use chrono::{Duration, Utc};
use regex::Regex;
use std::collections::BTreeMap;

pub const PASSWORD: &str = "correct-horse-42";

/// Builds the full site the way the server binary does, over the given config and pool.
macro_rules! init_site {
    ($config:expr, $pool:expr) => {{
        let config: blogicum_backend::config::Config = $config;
        let pool: blogicum_backend::DbPool = $pool;
        let tera = tera::Tera::new("templates/**/*.html").unwrap();
        let session_mw = actix_session::SessionMiddleware::builder(
            actix_session::storage::CookieSessionStore::default(),
            actix_web::cookie::Key::from(&[7u8; 64]),
        )
        .cookie_secure(false)
        .build();
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(actix_web::middleware::Compat::new(blogicum_backend::middleware::error_pages::error_handlers()))
                .wrap(blogicum_backend::routes::csrf_middleware(&config))
                .wrap(session_mw)
                .wrap(actix_web::middleware::NormalizePath::trim())
                .app_data(actix_web::web::Data::new(config.clone()))
                .app_data(actix_web::web::Data::new(tera))
                .app_data(actix_web::web::Data::new(pool))
                .configure(|cfg| blogicum_backend::routes::configure_app(cfg, &config))
                .default_service(actix_web::web::to(|| async { actix_web::HttpResponse::NotFound().finish() })),
        )
        .await
    }};
}

/// Logs `$username` in through the public form, leaving the session cookie in `$browser`.
macro_rules! login {
    ($app:expr, $browser:expr, $username:expr) => {{
        let resp = actix_web::test::call_service(
            &$app,
            $browser.request(actix_web::test::TestRequest::get().uri("/auth/login")).to_request(),
        )
        .await;
        $browser.absorb(&resp);
        let token = $crate::common::csrf_token_in(&actix_web::test::read_body(resp).await);
        let resp = actix_web::test::call_service(
            &$app,
            $browser
                .request(actix_web::test::TestRequest::post().uri("/auth/login"))
                .set_form([
                    ("csrf_token", token.as_str()),
                    ("username", $username),
                    ("password", $crate::common::PASSWORD),
                    ("next", ""),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::FOUND, "login failed for {}", $username);
        $browser.absorb(&resp);
        resp
    }};
}

pub fn test_config() -> Config {
    let media = std::env::temp_dir().join(format!("blogicum-test-media-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&media).unwrap();
    Config {
        web: WebConfig { host: "127.0.0.1".into(), port: 0 },
        blog: BlogConfig::default(),
        database_path: "/unused".into(),
        media_path: media.to_string_lossy().into_owned(),
        log_level: "warn".into(),
        session_secret_key: "07".repeat(64),
        admin_url_prefix: "staff".into(),
        use_secure_cookies: false,
    }
}

pub fn test_pool() -> DbPool {
    let pool = open_memory_pool().unwrap();
    let mut conn = pool.get().unwrap();
    db_setup::setup_blog_db(&mut conn).unwrap();
    drop(conn);
    pool
}

pub fn seed_account(pool: &DbPool, username: &str, is_staff: bool) -> i64 {
    let mut conn = pool.get().unwrap();
    let user = NewUser { username, is_staff, ..NewUser::default() };
    users_db_operations::create_user(&mut conn, &user, PASSWORD).unwrap()
}

pub fn seed_category(pool: &DbPool, slug: &str, is_published: bool) -> i64 {
    let conn = pool.get().unwrap();
    taxonomy_db_operations::create_category(&conn, &format!("Category {}", slug), "About things", slug, is_published)
        .unwrap()
}

/// `offset_hours` shifts the publication date relative to now.
pub fn seed_post(
    pool: &DbPool,
    author_id: i64,
    title: &str,
    category_id: Option<i64>,
    is_published: bool,
    offset_hours: i64,
) -> i64 {
    let conn = pool.get().unwrap();
    let input = PostInput {
        title: title.into(),
        text: format!("{} body text", title),
        pub_date: Utc::now() + Duration::hours(offset_hours),
        is_published,
        location_id: None,
        category_id,
    };
    posts_db_operations::create_post(&conn, author_id, &input, None).unwrap()
}

pub fn seed_comment(pool: &DbPool, post_id: i64, author_id: i64, text: &str) -> i64 {
    let conn = pool.get().unwrap();
    comments_db_operations::create_comment(&conn, post_id, author_id, text).unwrap()
}

const BOUNDARY: &str = "----blogicum-test-boundary";

/// One part of a `multipart/form-data` body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File { name: &'a str, filename: &'a str, content_type: &'a str, bytes: &'a [u8] },
}

/// Encodes `parts` as a multipart body; returns the content type header value and the body.
pub fn multipart_body(parts: &[Part]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", name, value).as_bytes(),
                );
            }
            Part::File { name, filename, content_type, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

/// Counts regular files anywhere below `dir`.
pub fn files_under(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() {
                        files_under(&path)
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

/// Cookies carried between requests of one simulated browser.
#[derive(Default)]
pub struct Browser {
    cookies: BTreeMap<String, Cookie<'static>>,
}

impl Browser {
    pub fn request(&self, req: TestRequest) -> TestRequest {
        self.cookies.values().fold(req, |req, cookie| req.cookie(cookie.clone()))
    }

    pub fn absorb<B>(&mut self, resp: &ServiceResponse<B>) {
        for cookie in resp.response().cookies() {
            self.cookies.insert(cookie.name().to_string(), cookie.into_owned());
        }
    }
}

pub fn location(resp: &ServiceResponse<impl actix_web::body::MessageBody>) -> String {
    resp.headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn csrf_token_in(body: &[u8]) -> String {
    let html = String::from_utf8_lossy(body);
    let re = Regex::new(r#"name="csrf_token" value="([^"]+)""#).unwrap();
    re.captures(&html)
        .map(|c| c[1].to_string())
        .expect("page has no csrf token")
}
