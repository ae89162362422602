use crate::config::Config;
use crate::middleware::{staff_guard, AuthenticatedUser};
use crate::models::Notification;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_csrf::CsrfMiddleware;
use actix_session::{Session, SessionExt};
use actix_web::http::Method;
use actix_web::{guard, web, FromRequest, HttpRequest, HttpResponse};
use rand::rngs::StdRng;
use tera::{Context, Tera};

pub mod admin;
pub mod auth;
pub mod blog;
pub mod pages;
pub mod profile;

/// Registers every public-facing route.
pub fn config_site(cfg: &mut web::ServiceConfig) {
    cfg.configure(auth::config_auth)
        .configure(pages::config_pages)
        .configure(profile::config_profile)
        .configure(blog::config_blog);
}

/// Mounts files, the staff-only admin area and the public site.
pub fn configure_app(cfg: &mut web::ServiceConfig, config: &Config) {
    cfg.service(actix_files::Files::new("/media", &config.media_path))
        .service(actix_files::Files::new("/static", "./static"))
        .service(
            web::scope(&config.admin_root())
                .configure(admin::config_login)
                .service(
                    web::scope("")
                        .guard(guard::fn_guard(|ctx| staff_guard(&ctx.get_session())))
                        .configure(admin::config_dashboard),
                ),
        )
        .configure(config_site);
}

/// Issues a token cookie on every form page; tokens are checked by the form extractors.
pub fn csrf_middleware(config: &Config) -> CsrfMiddleware<StdRng> {
    csrf_form_pages(&config.admin_root())
        .into_iter()
        .fold(CsrfMiddleware::<StdRng>::new(), |csrf, page| csrf.set_cookie(Method::GET, page))
}

/// Paths of every GET page that renders a CSRF-protected form.
pub fn csrf_form_pages(admin_root: &str) -> Vec<String> {
    let mut pages: Vec<String> = [
        "/",
        "/category/{slug}",
        "/posts/create",
        "/posts/{id}",
        "/posts/{id}/edit",
        "/posts/{id}/delete",
        "/posts/{post_id}/edit_comment/{comment_id}",
        "/posts/{post_id}/delete_comment/{comment_id}",
        "/profile/{username}",
        "/profile/{username}/edit",
        "/auth/login",
        "/auth/registration",
        "/pages/about",
        "/pages/rules",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect();
    pages.extend(admin::CSRF_FORM_PAGES.iter().map(|p| format!("{}{}", admin_root, p)));
    pages
}

pub fn set_notification(session: &Session, message: &str, r#type: &str) {
    let notification = Notification { message: message.to_string(), r#type: r#type.to_string() };
    if let Err(e) = session.insert("notification", &notification) {
        log::warn!("Could not store notification in session: {}", e);
    }
}

/// Context every page template expects: the session user, a pending
/// notification and, for staff, the admin entry point.
pub fn base_context(session: &Session, config: &Config) -> Context {
    let mut ctx = Context::new();
    let current_user = AuthenticatedUser::from_session(session);
    if current_user.as_ref().map_or(false, |u| u.is_staff) {
        ctx.insert("admin_root", &config.admin_root());
    }
    ctx.insert("current_user", &current_user);

    if let Ok(Some(notification)) = session.get::<Notification>("notification") {
        ctx.insert("notification", &notification);
        session.remove("notification");
    }
    ctx
}

pub fn render(tera: &Tera, template: &str, ctx: &Context) -> HttpResponse {
    match tera.render(template, ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error in '{}': {:?}", template, err);
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().append_header(("location", location)).finish()
}

pub fn post_url(post_id: i64) -> String {
    format!("/posts/{}", post_id)
}

pub fn profile_url(username: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(username.as_bytes()).collect();
    format!("/profile/{}", encoded)
}

pub type PooledConn = r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>;

pub fn get_conn(pool: &crate::DbPool) -> Result<PooledConn, HttpResponse> {
    pool.get().map_err(|e| {
        log::error!("Could not get DB connection from pool: {}", e);
        HttpResponse::InternalServerError().finish()
    })
}

/// Logs the failure and answers with a bare 500 for the error pages to render.
pub fn server_error(context: &str, err: impl std::fmt::Display) -> HttpResponse {
    log::error!("{}: {}", context, err);
    HttpResponse::InternalServerError().finish()
}

/// Reads a CSRF-checked urlencoded form from a payload the handler kept back,
/// so access checks can run before the body is touched.
pub async fn extract_csrf_form<T>(req: &HttpRequest, payload: web::Payload) -> Result<T, HttpResponse>
where
    T: serde::de::DeserializeOwned + CsrfGuarded + 'static,
{
    let mut payload = payload.into_inner();
    match Csrf::<web::Form<T>>::from_request(req, &mut payload).await {
        Ok(form) => Ok(form.into_inner().into_inner()),
        Err(e) => Err(HttpResponse::from_error(e)),
    }
}

/// Bare confirmation form used by delete and logout buttons.
#[derive(serde::Deserialize)]
pub struct ConfirmForm {
    pub csrf_token: CsrfToken,
}

impl CsrfGuarded for ConfirmForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}
