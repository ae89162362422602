use crate::config::Config;
use crate::helper::admin_helpers::{self, AdminHelperError, PostQuickEdit};
use crate::helper::form_helpers::{CategoryFormValues, FormErrors, LocationFormValues};
use crate::middleware::{start_session, AuthenticatedUser};
use crate::models::db_operations::{comments_db_operations, posts_db_operations, taxonomy_db_operations, users_db_operations};
use crate::routes::{base_context, get_conn, redirect, render, server_error, set_notification, ConfirmForm};
use crate::DbPool;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use tera::{Context, Tera};

/// Admin GET pages (relative to the admin root) that render CSRF-protected forms.
pub const CSRF_FORM_PAGES: [&str; 7] = [
    "/login",
    "/dashboard",
    "/{model}",
    "/category/add",
    "/category/{id}/change",
    "/location/add",
    "/location/{id}/change",
];

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct QuickEditForm {
    csrf_token: CsrfToken,
    is_published: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    pub_date: String,
}

impl CsrfGuarded for QuickEditForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct CategoryForm {
    csrf_token: CsrfToken,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    slug: String,
    is_published: Option<String>,
}

impl CsrfGuarded for CategoryForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct LocationForm {
    csrf_token: CsrfToken,
    #[serde(default)]
    name: String,
    is_published: Option<String>,
}

impl CsrfGuarded for LocationForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct ChangelistQuery {
    q: Option<String>,
    category: Option<String>,
    page: Option<String>,
}

fn is_checked(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some("on" | "true"))
}

pub fn config_login(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::get().to(show_admin_login_form))
        .route("/login", web::post().to(handle_admin_login))
        .route("/logout", web::post().to(handle_admin_logout));
}

/// Routes behind the staff guard. Fixed paths come before `/{model}`.
pub fn config_dashboard(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(redirect_to_dashboard))
        .route("/dashboard", web::get().to(show_admin_dashboard))
        .route("/post/{id}/quick-edit", web::post().to(quick_edit_post_action))
        .route("/post/{id}/delete", web::post().to(delete_post_action))
        .route("/comment/{id}/delete", web::post().to(delete_comment_action))
        .route("/category/add", web::get().to(show_add_category_form))
        .route("/category/add", web::post().to(add_category_action))
        .route("/category/{id}/change", web::get().to(show_change_category_form))
        .route("/category/{id}/change", web::post().to(change_category_action))
        .route("/category/{id}/delete", web::post().to(delete_category_action))
        .route("/location/add", web::get().to(show_add_location_form))
        .route("/location/add", web::post().to(add_location_action))
        .route("/location/{id}/change", web::get().to(show_change_location_form))
        .route("/location/{id}/change", web::post().to(change_location_action))
        .route("/location/{id}/delete", web::post().to(delete_location_action))
        .route("/{model}", web::get().to(show_changelist));
}

fn admin_context(session: &Session, config: &Config, csrf_token: &str) -> Context {
    let mut ctx = base_context(session, config);
    ctx.insert("admin_root", &config.admin_root());
    ctx.insert("csrf_token", csrf_token);
    ctx
}

async fn show_admin_login_form(
    session: Session,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    token: CsrfToken,
) -> impl Responder {
    if AuthenticatedUser::from_session(&session).map_or(false, |u| u.is_staff) {
        return redirect(&format!("{}/dashboard", config.admin_root()));
    }
    let mut ctx = admin_context(&session, &config, token.get());
    ctx.insert("username", "");
    render(&tera, "admin/login.html", &ctx)
}

async fn handle_admin_login(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    form: Csrf<web::Form<LoginForm>>,
) -> impl Responder {
    let login_data = form.into_inner();
    let username = login_data.username.trim();

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match users_db_operations::verify_credentials(&conn, username, &login_data.password) {
        Some(user) if user.is_staff => {
            if let Err(e) = start_session(&session, &user) {
                return server_error("Failed to start admin session", e);
            }
            if let Err(e) = users_db_operations::update_last_login_time(&conn, user.id) {
                log::error!("Failed to record last login for user {}: {}", user.id, e);
            }
            log::info!("Staff user '{}' logged in to the admin area", user.username);
            redirect(&format!("{}/dashboard", config.admin_root()))
        }
        _ => {
            log::warn!("Failed admin login attempt for username '{}'", username);
            let mut ctx = admin_context(&session, &config, login_data.csrf_token.get());
            ctx.insert("username", username);
            ctx.insert("login_error", "Please enter the correct username and password for a staff account.");
            render(&tera, "admin/login.html", &ctx)
        }
    }
}

async fn handle_admin_logout(
    session: Session,
    config: web::Data<Config>,
    _form: Csrf<web::Form<ConfirmForm>>,
) -> impl Responder {
    session.purge();
    redirect(&format!("{}/login", config.admin_root()))
}

async fn redirect_to_dashboard(config: web::Data<Config>) -> impl Responder {
    redirect(&format!("{}/dashboard", config.admin_root()))
}

async fn show_admin_dashboard(
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
    let dashboard = match admin_helpers::build_dashboard(&conn) {
        Ok(d) => d,
        Err(e) => return server_error("Failed to build admin dashboard", e),
    };

    let mut ctx = admin_context(&session, &config, token.get());
    ctx.insert("dashboard", &dashboard);
    render(&tera, "admin/dashboard.html", &ctx)
}

async fn show_changelist(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    model: web::Path<String>,
    query: web::Query<ChangelistQuery>,
    token: CsrfToken,
) -> impl Responder {
    let admin = match admin_helpers::find_model_admin(&model) {
        Ok(admin) => admin,
        Err(_) => return HttpResponse::NotFound().finish(),
    };
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let category_filter = query.category.as_deref().and_then(|c| c.parse::<i64>().ok());
    let changelist = match admin_helpers::build_changelist(
        &conn,
        admin,
        query.q.as_deref(),
        category_filter,
        config.blog.posts_per_page,
        query.page.as_deref(),
    ) {
        Ok(list) => list,
        Err(e) => return server_error("Failed to build admin changelist", e),
    };

    let mut ctx = admin_context(&session, &config, token.get());
    ctx.insert("cl", &changelist);
    render(&tera, "admin/changelist.html", &ctx)
}

fn changelist_url(config: &Config, model: &str) -> String {
    format!("{}/{}", config.admin_root(), model)
}

fn notify_form_errors(session: &Session, errors: &FormErrors) {
    let message = serde_json::to_value(errors)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .map(|fields| {
            fields
                .iter()
                .map(|(field, messages)| {
                    let text: Vec<&str> = messages
                        .as_array()
                        .map(|m| m.iter().filter_map(|v| v.as_str()).collect())
                        .unwrap_or_default();
                    format!("{}: {}", field, text.join(" "))
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_else(|| "Invalid input.".to_string());
    set_notification(session, &message, "error");
}

async fn quick_edit_post_action(
    session: Session,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    post_id: web::Path<i64>,
    form: Csrf<web::Form<QuickEditForm>>,
) -> impl Responder {
    let data = form.into_inner().into_inner();
    let edit = PostQuickEdit {
        is_published: is_checked(&data.is_published),
        category: data.category,
        pub_date: data.pub_date,
    };

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match admin_helpers::apply_post_quick_edit(&conn, *post_id, &edit) {
        Ok(Ok(true)) => set_notification(&session, &format!("Post {} updated.", post_id), "success"),
        Ok(Ok(false)) => return HttpResponse::NotFound().finish(),
        Ok(Err(errors)) => notify_form_errors(&session, &errors),
        Err(e) => return server_error("Failed to apply post quick edit", e),
    }
    redirect(&changelist_url(&config, "post"))
}

async fn delete_post_action(
    session: Session,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    post_id: web::Path<i64>,
    _form: Csrf<web::Form<ConfirmForm>>,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match posts_db_operations::delete_post(&conn, *post_id) {
        Ok(0) => HttpResponse::NotFound().finish(),
        Ok(_) => {
            log::info!("Admin deleted post {}", post_id);
            set_notification(&session, "Post deleted.", "success");
            redirect(&changelist_url(&config, "post"))
        }
        Err(e) => server_error("Failed to delete post", e),
    }
}

async fn delete_comment_action(
    session: Session,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    comment_id: web::Path<i64>,
    _form: Csrf<web::Form<ConfirmForm>>,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match comments_db_operations::delete_comment(&conn, *comment_id) {
        Ok(0) => HttpResponse::NotFound().finish(),
        Ok(_) => {
            set_notification(&session, "Comment deleted.", "success");
            redirect(&changelist_url(&config, "comment"))
        }
        Err(e) => server_error("Failed to delete comment", e),
    }
}

fn render_category_form(
    session: &Session,
    tera: &Tera,
    config: &Config,
    conn: &rusqlite::Connection,
    category_id: Option<i64>,
    values: &CategoryFormValues,
    errors: &FormErrors,
    csrf_token: &str,
) -> HttpResponse {
    let mut ctx = admin_context(session, config, csrf_token);
    ctx.insert("category_id", &category_id);
    ctx.insert("form", values);
    ctx.insert("errors", errors);
    if let Some(id) = category_id {
        let attached = taxonomy_db_operations::read_category(conn, id)
            .map_err(AdminHelperError::from)
            .and_then(|c| admin_helpers::posts_attached_to(conn, c.as_ref(), None));
        match attached {
            Ok(posts) => ctx.insert("attached_posts", &posts),
            Err(e) => return server_error("Failed to load posts attached to category", e),
        }
    }
    render(tera, "admin/category_form.html", &ctx)
}

async fn show_add_category_form(
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
    let values = CategoryFormValues::blank();
    render_category_form(&session, &tera, &config, &conn, None, &values, &FormErrors::default(), token.get())
}

async fn show_change_category_form(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    category_id: web::Path<i64>,
    token: CsrfToken,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let category = match taxonomy_db_operations::read_category(&conn, *category_id) {
        Ok(Some(c)) => c,
        Ok(None) => return HttpResponse::NotFound().finish(),
        Err(e) => return server_error("Failed to load category", e),
    };
    let values = CategoryFormValues::from_category(&category);
    render_category_form(&session, &tera, &config, &conn, Some(category.id), &values, &FormErrors::default(), token.get())
}

/// Shared by add (`category_id` is `None`) and change.
async fn save_category(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    category_id: Option<i64>,
    data: CategoryForm,
) -> HttpResponse {
    let values = CategoryFormValues {
        title: data.title,
        description: data.description,
        slug: data.slug.trim().to_string(),
        is_published: is_checked(&data.is_published),
    };

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    if let Some(id) = category_id {
        match taxonomy_db_operations::read_category(&conn, id) {
            Ok(Some(_)) => {}
            Ok(None) => return HttpResponse::NotFound().finish(),
            Err(e) => return server_error("Failed to load category", e),
        }
    }
    let input = match values.validate(&conn, category_id) {
        Ok(Ok(input)) => input,
        Ok(Err(errors)) => {
            return render_category_form(&session, &tera, &config, &conn, category_id, &values, &errors, data.csrf_token.get())
        }
        Err(e) => return server_error("Failed to validate category form", e),
    };

    let saved = match category_id {
        Some(id) => taxonomy_db_operations::update_category(
            &conn,
            id,
            &input.title,
            &input.description,
            &input.slug,
            input.is_published,
        )
        .map(|_| id),
        None => taxonomy_db_operations::create_category(&conn, &input.title, &input.description, &input.slug, input.is_published),
    };
    match saved {
        Ok(id) => {
            log::info!("Admin saved category {} ('{}')", id, input.slug);
            set_notification(&session, &format!("Category '{}' saved.", input.title), "success");
            redirect(&changelist_url(&config, "category"))
        }
        Err(e) => server_error("Failed to save category", e),
    }
}

async fn add_category_action(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    form: Csrf<web::Form<CategoryForm>>,
) -> impl Responder {
    save_category(session, tera, pool, config, None, form.into_inner().into_inner()).await
}

async fn change_category_action(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    category_id: web::Path<i64>,
    form: Csrf<web::Form<CategoryForm>>,
) -> impl Responder {
    save_category(session, tera, pool, config, Some(*category_id), form.into_inner().into_inner()).await
}

async fn delete_category_action(
    session: Session,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    category_id: web::Path<i64>,
    _form: Csrf<web::Form<ConfirmForm>>,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match taxonomy_db_operations::delete_category(&conn, *category_id) {
        Ok(0) => HttpResponse::NotFound().finish(),
        Ok(_) => {
            log::info!("Admin deleted category {}", category_id);
            set_notification(&session, "Category deleted. Its posts were kept without a category.", "success");
            redirect(&changelist_url(&config, "category"))
        }
        Err(e) => server_error("Failed to delete category", e),
    }
}

fn render_location_form(
    session: &Session,
    tera: &Tera,
    config: &Config,
    conn: &rusqlite::Connection,
    location_id: Option<i64>,
    values: &LocationFormValues,
    errors: &FormErrors,
    csrf_token: &str,
) -> HttpResponse {
    let mut ctx = admin_context(session, config, csrf_token);
    ctx.insert("location_id", &location_id);
    ctx.insert("form", values);
    ctx.insert("errors", errors);
    if let Some(id) = location_id {
        let attached = taxonomy_db_operations::read_location(conn, id)
            .map_err(AdminHelperError::from)
            .and_then(|l| admin_helpers::posts_attached_to(conn, None, l.as_ref()));
        match attached {
            Ok(posts) => ctx.insert("attached_posts", &posts),
            Err(e) => return server_error("Failed to load posts attached to location", e),
        }
    }
    render(tera, "admin/location_form.html", &ctx)
}

async fn show_add_location_form(
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
    let values = LocationFormValues::blank();
    render_location_form(&session, &tera, &config, &conn, None, &values, &FormErrors::default(), token.get())
}

async fn show_change_location_form(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    location_id: web::Path<i64>,
    token: CsrfToken,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let location = match taxonomy_db_operations::read_location(&conn, *location_id) {
        Ok(Some(l)) => l,
        Ok(None) => return HttpResponse::NotFound().finish(),
        Err(e) => return server_error("Failed to load location", e),
    };
    let values = LocationFormValues::from_location(&location);
    render_location_form(&session, &tera, &config, &conn, Some(location.id), &values, &FormErrors::default(), token.get())
}

async fn save_location(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    location_id: Option<i64>,
    data: LocationForm,
) -> HttpResponse {
    let values = LocationFormValues { name: data.name, is_published: is_checked(&data.is_published) };

    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    if let Some(id) = location_id {
        match taxonomy_db_operations::read_location(&conn, id) {
            Ok(Some(_)) => {}
            Ok(None) => return HttpResponse::NotFound().finish(),
            Err(e) => return server_error("Failed to load location", e),
        }
    }
    let name = match values.validate(&conn, location_id) {
        Ok(Ok(name)) => name,
        Ok(Err(errors)) => {
            return render_location_form(&session, &tera, &config, &conn, location_id, &values, &errors, data.csrf_token.get())
        }
        Err(e) => return server_error("Failed to validate location form", e),
    };

    let saved = match location_id {
        Some(id) => taxonomy_db_operations::update_location(&conn, id, &name, values.is_published).map(|_| id),
        None => taxonomy_db_operations::create_location(&conn, &name, values.is_published),
    };
    match saved {
        Ok(id) => {
            log::info!("Admin saved location {} ('{}')", id, name);
            set_notification(&session, &format!("Location '{}' saved.", name), "success");
            redirect(&changelist_url(&config, "location"))
        }
        Err(e) => server_error("Failed to save location", e),
    }
}

async fn add_location_action(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    form: Csrf<web::Form<LocationForm>>,
) -> impl Responder {
    save_location(session, tera, pool, config, None, form.into_inner().into_inner()).await
}

async fn change_location_action(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    location_id: web::Path<i64>,
    form: Csrf<web::Form<LocationForm>>,
) -> impl Responder {
    save_location(session, tera, pool, config, Some(*location_id), form.into_inner().into_inner()).await
}

async fn delete_location_action(
    session: Session,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    location_id: web::Path<i64>,
    _form: Csrf<web::Form<ConfirmForm>>,
) -> impl Responder {
    let conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match taxonomy_db_operations::delete_location(&conn, *location_id) {
        Ok(0) => HttpResponse::NotFound().finish(),
        Ok(_) => {
            log::info!("Admin deleted location {}", location_id);
            set_notification(&session, "Location deleted. Its posts were kept without a location.", "success");
            redirect(&changelist_url(&config, "location"))
        }
        Err(e) => server_error("Failed to delete location", e),
    }
}
