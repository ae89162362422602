use crate::config::Config;
use crate::helper::form_helpers::{FormErrors, ProfileFormValues};
use crate::helper::media_helpers;
use crate::helper::ownership_helpers::{check_ownership, Ownership};
use crate::helper::public_helpers;
use crate::middleware::{multipart_csrf_ok, AuthenticatedUser};
use crate::models::db_operations::users_db_operations;
use crate::models::User;
use crate::routes::blog::PageQuery;
use crate::routes::{base_context, get_conn, profile_url, redirect, render, server_error, set_notification};
use crate::DbPool;
use actix_csrf::extractor::CsrfToken;
use actix_multipart::Multipart;
use actix_session::Session;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use std::path::Path;
use tera::Tera;

const AVATAR_DIR: &str = "avatars";

pub fn config_profile(cfg: &mut web::ServiceConfig) {
    cfg.route("/profile/{username}", web::get().to(show_profile))
        .route("/profile/{username}/edit", web::get().to(show_edit_profile_form))
        .route("/profile/{username}/edit", web::post().to(edit_profile_action));
}

async fn show_profile(
    session: Session,
    viewer: Option<AuthenticatedUser>,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    username: web::Path<String>,
    query: web::Query<PageQuery>,
    token: CsrfToken,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let (profile, page) = match public_helpers::fetch_profile_page(
        &conn,
        &username,
        Utc::now(),
        config.blog.posts_per_page,
        query.page.as_deref(),
    ) {
        Ok(Some(found)) => found,
        Ok(None) => return HttpResponse::NotFound().finish(),
        Err(e) => return server_error("Failed to fetch profile", e),
    };

    let mut ctx = base_context(&session, &config);
    ctx.insert("csrf_token", token.get());
    ctx.insert("can_edit_profile", &(viewer.map(|v| v.id) == Some(profile.id)));
    ctx.insert("profile", &profile);
    ctx.insert("page_obj", &page);
    render(&tera, "blog/profile.html", &ctx)
}

/// Profiles can only be edited by their owner; others are sent to the profile page.
fn owned_profile(pool: &DbPool, username: &str, user: &AuthenticatedUser) -> Result<User, HttpResponse> {
    let conn = get_conn(pool)?;
    let found = users_db_operations::read_user_by_username(&conn, username)
        .map_err(|e| server_error("Failed to load profile for ownership check", e))?;
    match check_ownership(found, user.id) {
        Ownership::Owner(profile) => Ok(profile),
        Ownership::NotOwner(profile) => Err(redirect(&profile_url(&profile.username))),
        Ownership::Missing => Err(HttpResponse::NotFound().finish()),
    }
}

fn render_profile_form(
    session: &Session,
    tera: &Tera,
    config: &Config,
    profile: &User,
    values: &ProfileFormValues,
    errors: &FormErrors,
    csrf_token: &str,
) -> HttpResponse {
    let mut ctx = base_context(session, config);
    ctx.insert("profile", profile);
    ctx.insert("form", values);
    ctx.insert("errors", errors);
    ctx.insert("csrf_token", csrf_token);
    ctx.insert("max_upload_size_mb", &config.blog.max_upload_size_mb);
    render(tera, "blog/user.html", &ctx)
}

async fn show_edit_profile_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    username: web::Path<String>,
    token: CsrfToken,
) -> impl Responder {
    match owned_profile(&pool, &username, &user) {
        Ok(profile) => {
            let values = ProfileFormValues::from_user(&profile);
            render_profile_form(&session, &tera, &config, &profile, &values, &FormErrors::default(), token.get())
        }
        Err(response) => response,
    }
}

async fn edit_profile_action(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    username: web::Path<String>,
    payload: Multipart,
) -> impl Responder {
    let profile = match owned_profile(&pool, &username, &user) {
        Ok(profile) => profile,
        Err(response) => return response,
    };

    let mut form = match media_helpers::read_multipart_form(payload, &["avatar"], config.max_upload_bytes()).await {
        Ok(form) => form,
        Err(e) => {
            log::warn!("Rejected profile form upload: {}", e);
            return HttpResponse::BadRequest().body(e.to_string());
        }
    };
    let csrf_token = form.fields.get("csrf_token").cloned().unwrap_or_default();
    if !multipart_csrf_ok(&req, Some(&csrf_token)) {
        log::warn!("CSRF token mismatch on profile form for '{}'", user.username);
        return HttpResponse::Forbidden().finish();
    }
    let clear_avatar = form.fields.get("avatar-clear").map_or(false, |v| v == "on" || v == "true");

    let values = ProfileFormValues::from_fields(&form.fields);
    let validated = {
        let conn = match get_conn(&pool) {
            Ok(c) => c,
            Err(response) => return response,
        };
        match values.validate(&conn, profile.id) {
            Ok(result) => result,
            Err(e) => return server_error("Failed to validate profile form", e),
        }
    };

    let mut errors = std::mem::take(&mut form.file_errors);
    if clear_avatar && form.files.contains_key("avatar") {
        errors.add("avatar", "Please either submit a file or check the clear checkbox, not both.");
    }
    let input = match validated {
        Ok(input) if errors.is_empty() => input,
        other => {
            if let Err(field_errors) = other {
                errors.merge(field_errors);
            }
            return render_profile_form(&session, &tera, &config, &profile, &values, &errors, &csrf_token);
        }
    };

    let media_root = Path::new(&config.media_path);
    let new_avatar = match form.files.remove("avatar") {
        Some(image) => match media_helpers::save_image(media_root, AVATAR_DIR, image).await {
            Ok(path) => Some(path),
            Err(e) => return server_error("Failed to save avatar", e),
        },
        None => None,
    };
    let avatar_update: Option<Option<&str>> = match (&new_avatar, clear_avatar) {
        (Some(path), _) => Some(Some(path.as_str())),
        (None, true) => Some(None),
        (None, false) => None,
    };

    let mut conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    if let Err(e) = users_db_operations::update_profile(&mut conn, profile.id, &input, avatar_update) {
        return server_error("Failed to update profile", e);
    }
    drop(conn);

    if avatar_update.is_some() {
        if let Some(old) = &profile.avatar {
            media_helpers::remove_image(media_root, old).await;
        }
    }
    if input.username != user.username {
        if let Err(e) = session.insert("username", &input.username) {
            log::warn!("Could not refresh session username: {}", e);
        }
    }

    log::info!("User {} updated their profile", profile.id);
    set_notification(&session, "Profile updated.", "success");
    redirect(&profile_url(&input.username))
}
