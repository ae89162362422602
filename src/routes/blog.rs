use crate::config::Config;
use crate::helper::form_helpers::{self, FormErrors, PostFormValues};
use crate::helper::media_helpers::{self, MultipartForm};
use crate::helper::ownership_helpers::{self, Ownership};
use crate::helper::public_helpers;
use crate::middleware::{multipart_csrf_ok, AuthenticatedUser};
use crate::models::db_operations::posts_db_operations::{self, ImageUpdate};
use crate::models::db_operations::{comments_db_operations, taxonomy_db_operations};
use crate::models::{Comment, Post, PostScope};
use crate::routes::{
    base_context, extract_csrf_form, get_conn, post_url, profile_url, redirect, render, server_error,
    set_notification, ConfirmForm,
};
use crate::DbPool;
use actix_csrf::extractor::{CsrfGuarded, CsrfToken};
use actix_multipart::Multipart;
use actix_session::Session;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use tera::{Context, Tera};

const POST_IMAGE_DIR: &str = "posts_images";

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Deserialize)]
struct CommentForm {
    csrf_token: CsrfToken,
    #[serde(default)]
    text: String,
}

impl CsrfGuarded for CommentForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

pub fn config_blog(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/category/{slug}", web::get().to(category_posts))
        .route("/posts/create", web::get().to(show_create_post_form))
        .route("/posts/create", web::post().to(create_post_action))
        .route("/posts/{id}", web::get().to(post_detail))
        .route("/posts/{id}/edit", web::get().to(show_edit_post_form))
        .route("/posts/{id}/edit", web::post().to(edit_post_action))
        .route("/posts/{id}/delete", web::get().to(show_delete_post_form))
        .route("/posts/{id}/delete", web::post().to(delete_post_action))
        .route("/posts/{id}/comment", web::post().to(add_comment_action))
        .route("/posts/{post_id}/edit_comment/{comment_id}", web::get().to(show_edit_comment_form))
        .route("/posts/{post_id}/edit_comment/{comment_id}", web::post().to(edit_comment_action))
        .route("/posts/{post_id}/delete_comment/{comment_id}", web::get().to(show_delete_comment_form))
        .route("/posts/{post_id}/delete_comment/{comment_id}", web::post().to(delete_comment_action));
}

async fn index(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    query: web::Query<PageQuery>,
    token: CsrfToken,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let page = match public_helpers::fetch_visible_page(
        &conn,
        Utc::now(),
        PostScope::All,
        config.blog.posts_per_page,
        query.page.as_deref(),
    ) {
        Ok(page) => page,
        Err(e) => return server_error("Failed to fetch home page posts", e),
    };

    let mut ctx = base_context(&session, &config);
    ctx.insert("csrf_token", token.get());
    ctx.insert("page_obj", &page);
    render(&tera, "blog/index.html", &ctx)
}

async fn category_posts(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    slug: web::Path<String>,
    query: web::Query<PageQuery>,
    token: CsrfToken,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let (category, page) = match public_helpers::fetch_category_page(
        &conn,
        &slug,
        Utc::now(),
        config.blog.posts_per_page,
        query.page.as_deref(),
    ) {
        Ok(Some(found)) => found,
        Ok(None) => return HttpResponse::NotFound().finish(),
        Err(e) => return server_error("Failed to fetch category posts", e),
    };

    let mut ctx = base_context(&session, &config);
    ctx.insert("csrf_token", token.get());
    ctx.insert("category", &category);
    ctx.insert("page_obj", &page);
    render(&tera, "blog/category.html", &ctx)
}

async fn post_detail(
    session: Session,
    viewer: Option<AuthenticatedUser>,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    post_id: web::Path<i64>,
    token: CsrfToken,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let viewer_id = viewer.as_ref().map(|v| v.id);
    let (post, comments) = match public_helpers::fetch_post_detail(&conn, *post_id, viewer_id, Utc::now()) {
        Ok(Some(found)) => found,
        Ok(None) => return HttpResponse::NotFound().finish(),
        Err(e) => return server_error("Failed to fetch post detail", e),
    };

    let mut ctx = base_context(&session, &config);
    ctx.insert("csrf_token", token.get());
    ctx.insert("is_author", &(viewer_id == Some(post.author.id)));
    ctx.insert("post", &post);
    ctx.insert("comments", &comments);
    ctx.insert("comment_errors", &FormErrors::default());
    render(&tera, "blog/detail.html", &ctx)
}

/// Context shared by the create, edit and delete post pages.
fn post_form_context(
    session: &Session,
    config: &Config,
    conn: &rusqlite::Connection,
    mode: &str,
    values: &PostFormValues,
    errors: &FormErrors,
    csrf_token: &str,
) -> Result<Context, HttpResponse> {
    let categories = taxonomy_db_operations::read_all_categories(conn)
        .map_err(|e| server_error("Failed to load categories for post form", e))?;
    let locations = taxonomy_db_operations::read_all_locations(conn)
        .map_err(|e| server_error("Failed to load locations for post form", e))?;

    let mut ctx = base_context(session, config);
    ctx.insert("mode", mode);
    ctx.insert("form", values);
    ctx.insert("errors", errors);
    ctx.insert("categories", &categories);
    ctx.insert("locations", &locations);
    ctx.insert("csrf_token", csrf_token);
    ctx.insert("max_upload_size_mb", &config.blog.max_upload_size_mb);
    Ok(ctx)
}

async fn show_create_post_form(
    _user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    token: CsrfToken,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let values = PostFormValues::blank(Utc::now());
    match post_form_context(&session, &config, &conn, "create", &values, &FormErrors::default(), token.get()) {
        Ok(ctx) => render(&tera, "blog/create.html", &ctx),
        Err(response) => response,
    }
}

/// Buffers the multipart body and checks its CSRF token.
async fn read_post_form(req: &HttpRequest, payload: Multipart, config: &Config) -> Result<MultipartForm, HttpResponse> {
    let form = match media_helpers::read_multipart_form(payload, &["image"], config.max_upload_bytes()).await {
        Ok(form) => form,
        Err(e) => {
            log::warn!("Rejected post form upload: {}", e);
            return Err(HttpResponse::BadRequest().body(e.to_string()));
        }
    };
    if !multipart_csrf_ok(req, form.fields.get("csrf_token").map(String::as_str)) {
        log::warn!("CSRF token mismatch on multipart post form at {}", req.path());
        return Err(HttpResponse::Forbidden().finish());
    }
    Ok(form)
}

fn is_checked(form: &MultipartForm, name: &str) -> bool {
    form.fields.get(name).map_or(false, |v| v == "on" || v == "true")
}

async fn create_post_action(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    payload: Multipart,
) -> impl Responder {
    let mut form = match read_post_form(&req, payload, &config).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let csrf_token = form.fields.get("csrf_token").cloned().unwrap_or_default();

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let (categories, locations) = match (
        taxonomy_db_operations::read_all_categories(&conn),
        taxonomy_db_operations::read_all_locations(&conn),
    ) {
        (Ok(c), Ok(l)) => (c, l),
        (Err(e), _) | (_, Err(e)) => return server_error("Failed to load taxonomy for post form", e),
    };

    let values = PostFormValues::from_fields(&form.fields);
    let validated = values.validate(&categories, &locations, Utc::now());
    let input = match validated {
        Ok(input) if form.file_errors.is_empty() => input,
        other => {
            let mut errors = other.err().unwrap_or_default();
            errors.merge(std::mem::take(&mut form.file_errors));
            return match post_form_context(&session, &config, &conn, "create", &values, &errors, &csrf_token) {
                Ok(ctx) => render(&tera, "blog/create.html", &ctx),
                Err(response) => response,
            };
        }
    };
    drop(conn);

    let image = match form.files.remove("image") {
        Some(image) => match media_helpers::save_image(Path::new(&config.media_path), POST_IMAGE_DIR, image).await {
            Ok(path) => Some(path),
            Err(e) => return server_error("Failed to save post image", e),
        },
        None => None,
    };

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match posts_db_operations::create_post(&conn, user.id, &input, image.as_deref()) {
        Ok(post_id) => {
            log::info!("User '{}' created post {}", user.username, post_id);
            set_notification(&session, "Post published.", "success");
            redirect(&profile_url(&user.username))
        }
        Err(e) => server_error("Failed to create post", e),
    }
}

/// Resolves the ownership gate into the owned post or the response to send instead.
fn owned_post(pool: &DbPool, post_id: i64, user: &AuthenticatedUser) -> Result<Post, HttpResponse> {
    let conn = get_conn(pool)?;
    match ownership_helpers::post_for_author(&conn, post_id, user.id) {
        Ok(Ownership::Owner(post)) => Ok(post),
        Ok(Ownership::NotOwner(post)) => {
            log::warn!("User '{}' tried to modify post {} owned by someone else", user.username, post.id);
            Err(redirect(&post_url(post.id)))
        }
        Ok(Ownership::Missing) => Err(HttpResponse::NotFound().finish()),
        Err(e) => Err(server_error("Failed to load post for ownership check", e)),
    }
}

async fn show_edit_post_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    post_id: web::Path<i64>,
    token: CsrfToken,
) -> impl Responder {
    let post = match owned_post(&pool, *post_id, &user) {
        Ok(post) => post,
        Err(response) => return response,
    };
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let values = PostFormValues::from_post(&post);
    match post_form_context(&session, &config, &conn, "edit", &values, &FormErrors::default(), token.get()) {
        Ok(mut ctx) => {
            ctx.insert("post", &post);
            render(&tera, "blog/create.html", &ctx)
        }
        Err(response) => response,
    }
}

async fn edit_post_action(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    post_id: web::Path<i64>,
    payload: Multipart,
) -> impl Responder {
    let post = match owned_post(&pool, *post_id, &user) {
        Ok(post) => post,
        Err(response) => return response,
    };

    let mut form = match read_post_form(&req, payload, &config).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let csrf_token = form.fields.get("csrf_token").cloned().unwrap_or_default();
    let clear_image = is_checked(&form, "image-clear");

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let (categories, locations) = match (
        taxonomy_db_operations::read_all_categories(&conn),
        taxonomy_db_operations::read_all_locations(&conn),
    ) {
        (Ok(c), Ok(l)) => (c, l),
        (Err(e), _) | (_, Err(e)) => return server_error("Failed to load taxonomy for post form", e),
    };

    let values = PostFormValues::from_fields(&form.fields);
    let mut errors = FormErrors::default();
    let validated = values.validate(&categories, &locations, Utc::now());
    errors.merge(std::mem::take(&mut form.file_errors));
    if clear_image && form.files.contains_key("image") {
        errors.add("image", "Please either submit a file or check the clear checkbox, not both.");
    }
    let input = match validated {
        Ok(input) if errors.is_empty() => input,
        other => {
            if let Err(field_errors) = other {
                errors.merge(field_errors);
            }
            return match post_form_context(&session, &config, &conn, "edit", &values, &errors, &csrf_token) {
                Ok(mut ctx) => {
                    ctx.insert("post", &post);
                    render(&tera, "blog/create.html", &ctx)
                }
                Err(response) => response,
            };
        }
    };
    drop(conn);

    let media_root = Path::new(&config.media_path);
    let image_update = match form.files.remove("image") {
        Some(image) => match media_helpers::save_image(media_root, POST_IMAGE_DIR, image).await {
            Ok(path) => ImageUpdate::Replace(path),
            Err(e) => return server_error("Failed to save post image", e),
        },
        None if clear_image => ImageUpdate::Clear,
        None => ImageUpdate::Keep,
    };

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    if let Err(e) = posts_db_operations::update_post(&conn, post.id, &input, &image_update) {
        return server_error("Failed to update post", e);
    }
    drop(conn);

    if let (Some(old), ImageUpdate::Clear | ImageUpdate::Replace(_)) = (&post.image, &image_update) {
        media_helpers::remove_image(media_root, old).await;
    }
    log::info!("User '{}' updated post {}", user.username, post.id);
    set_notification(&session, "Post updated.", "success");
    redirect(&post_url(post.id))
}

async fn show_delete_post_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    post_id: web::Path<i64>,
    token: CsrfToken,
) -> impl Responder {
    let post = match owned_post(&pool, *post_id, &user) {
        Ok(post) => post,
        Err(response) => return response,
    };
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let values = PostFormValues::from_post(&post);
    match post_form_context(&session, &config, &conn, "delete", &values, &FormErrors::default(), token.get()) {
        Ok(mut ctx) => {
            ctx.insert("post", &post);
            render(&tera, "blog/create.html", &ctx)
        }
        Err(response) => response,
    }
}

async fn delete_post_action(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    post_id: web::Path<i64>,
    payload: web::Payload,
) -> impl Responder {
    let post = match owned_post(&pool, *post_id, &user) {
        Ok(post) => post,
        Err(response) => return response,
    };
    if let Err(response) = extract_csrf_form::<ConfirmForm>(&req, payload).await {
        return response;
    }

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    if let Err(e) = posts_db_operations::delete_post(&conn, post.id) {
        return server_error("Failed to delete post", e);
    }
    drop(conn);

    if let Some(image) = &post.image {
        media_helpers::remove_image(Path::new(&config.media_path), image).await;
    }
    log::info!("User '{}' deleted post {}", user.username, post.id);
    set_notification(&session, "Post deleted.", "success");
    redirect("/")
}

async fn add_comment_action(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<DbPool>,
    post_id: web::Path<i64>,
    payload: web::Payload,
) -> impl Responder {
    let post_id = *post_id;
    {
        let conn = match get_conn(&pool) {
            Ok(c) => c,
            Err(response) => return response,
        };
        match public_helpers::fetch_viewable_post(&conn, post_id, Some(user.id), Utc::now()) {
            Ok(Some(_)) => {}
            Ok(None) => return HttpResponse::NotFound().finish(),
            Err(e) => return server_error("Failed to load post for comment", e),
        }
    }

    let form = match extract_csrf_form::<CommentForm>(&req, payload).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let text = match form_helpers::validate_comment_text(&form.text) {
        Ok(text) => text,
        Err(_) => {
            set_notification(&session, "Comment text cannot be empty.", "error");
            return redirect(&post_url(post_id));
        }
    };

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match comments_db_operations::create_comment(&conn, post_id, user.id, &text) {
        Ok(_) => redirect(&post_url(post_id)),
        Err(e) => server_error("Failed to create comment", e),
    }
}

fn owned_comment(pool: &DbPool, post_id: i64, comment_id: i64, user: &AuthenticatedUser) -> Result<Comment, HttpResponse> {
    let conn = get_conn(pool)?;
    match ownership_helpers::comment_for_author(&conn, post_id, comment_id, user.id) {
        Ok(Ownership::Owner(comment)) => Ok(comment),
        Ok(Ownership::NotOwner(comment)) => {
            log::warn!("User '{}' tried to modify comment {} owned by someone else", user.username, comment.id);
            Err(redirect(&post_url(comment.post_id)))
        }
        Ok(Ownership::Missing) => Err(HttpResponse::NotFound().finish()),
        Err(e) => Err(server_error("Failed to load comment for ownership check", e)),
    }
}

fn render_comment_page(
    session: &Session,
    tera: &Tera,
    config: &Config,
    mode: &str,
    comment: &Comment,
    text: &str,
    errors: &FormErrors,
    csrf_token: &str,
) -> HttpResponse {
    let mut ctx = base_context(session, config);
    ctx.insert("mode", mode);
    ctx.insert("comment", comment);
    ctx.insert("text", text);
    ctx.insert("errors", errors);
    ctx.insert("csrf_token", csrf_token);
    render(tera, "blog/comment.html", &ctx)
}

async fn show_edit_comment_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    path: web::Path<(i64, i64)>,
    token: CsrfToken,
) -> impl Responder {
    let (post_id, comment_id) = path.into_inner();
    match owned_comment(&pool, post_id, comment_id, &user) {
        Ok(comment) => render_comment_page(
            &session,
            &tera,
            &config,
            "edit",
            &comment,
            &comment.text,
            &FormErrors::default(),
            token.get(),
        ),
        Err(response) => response,
    }
}

async fn edit_comment_action(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    path: web::Path<(i64, i64)>,
    payload: web::Payload,
) -> impl Responder {
    let (post_id, comment_id) = path.into_inner();
    let comment = match owned_comment(&pool, post_id, comment_id, &user) {
        Ok(comment) => comment,
        Err(response) => return response,
    };
    let form = match extract_csrf_form::<CommentForm>(&req, payload).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let text = match form_helpers::validate_comment_text(&form.text) {
        Ok(text) => text,
        Err(errors) => {
            return render_comment_page(
                &session,
                &tera,
                &config,
                "edit",
                &comment,
                &form.text,
                &errors,
                form.csrf_token.get(),
            )
        }
    };

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match comments_db_operations::update_comment_text(&conn, comment.id, &text) {
        Ok(_) => redirect(&post_url(post_id)),
        Err(e) => server_error("Failed to update comment", e),
    }
}

async fn show_delete_comment_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    path: web::Path<(i64, i64)>,
    token: CsrfToken,
) -> impl Responder {
    let (post_id, comment_id) = path.into_inner();
    match owned_comment(&pool, post_id, comment_id, &user) {
        Ok(comment) => render_comment_page(
            &session,
            &tera,
            &config,
            "delete",
            &comment,
            &comment.text,
            &FormErrors::default(),
            token.get(),
        ),
        Err(response) => response,
    }
}

async fn delete_comment_action(
    req: HttpRequest,
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    path: web::Path<(i64, i64)>,
    payload: web::Payload,
) -> impl Responder {
    let (post_id, comment_id) = path.into_inner();
    let comment = match owned_comment(&pool, post_id, comment_id, &user) {
        Ok(comment) => comment,
        Err(response) => return response,
    };
    if let Err(response) = extract_csrf_form::<ConfirmForm>(&req, payload).await {
        return response;
    }

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match comments_db_operations::delete_comment(&conn, comment.id) {
        Ok(_) => redirect(&post_url(post_id)),
        Err(e) => server_error("Failed to delete comment", e),
    }
}
