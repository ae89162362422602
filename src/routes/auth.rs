use crate::config::Config;
use crate::helper::form_helpers::{FormErrors, RegistrationFormValues};
use crate::middleware::{safe_next, start_session, LOGIN_PATH};
use crate::models::db_operations::users_db_operations::{self, NewUser};
use crate::routes::{base_context, get_conn, profile_url, redirect, render, server_error, set_notification, ConfirmForm};
use crate::DbPool;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use tera::Tera;

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    next: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct RegistrationForm {
    csrf_token: CsrfToken,
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password1: String,
    #[serde(default)]
    password2: String,
}

impl CsrfGuarded for RegistrationForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct NextQuery {
    next: Option<String>,
}

/// Values echoed back into the login form; never the password.
#[derive(Serialize)]
struct LoginFormValues<'a> {
    username: &'a str,
    next: &'a str,
}

pub fn config_auth(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/login", web::get().to(show_login_form))
        .route("/auth/login", web::post().to(handle_login))
        .route("/auth/registration", web::get().to(show_registration_form))
        .route("/auth/registration", web::post().to(handle_registration))
        .route("/auth/logout", web::post().to(handle_logout));
}

fn render_login(
    session: &Session,
    tera: &Tera,
    config: &Config,
    values: LoginFormValues,
    error: Option<&str>,
    csrf_token: &str,
) -> HttpResponse {
    let mut ctx = base_context(session, config);
    ctx.insert("form", &values);
    ctx.insert("login_error", &error);
    ctx.insert("csrf_token", csrf_token);
    render(tera, "registration/login.html", &ctx)
}

async fn show_login_form(
    session: Session,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    query: web::Query<NextQuery>,
    token: CsrfToken,
) -> impl Responder {
    let next = safe_next(query.next.as_deref()).unwrap_or_default();
    render_login(&session, &tera, &config, LoginFormValues { username: "", next: &next }, None, token.get())
}

async fn handle_login(
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
    let user = match users_db_operations::verify_credentials(&conn, username, &login_data.password) {
        Some(user) => user,
        None => {
            log::warn!("Failed login attempt for username '{}'", username);
            return render_login(
                &session,
                &tera,
                &config,
                LoginFormValues { username, next: &login_data.next },
                Some("Please enter a correct username and password. Note that both fields may be case-sensitive."),
                login_data.csrf_token.get(),
            );
        }
    };

    if let Err(e) = start_session(&session, &user) {
        return server_error("Failed to start session", e);
    }
    if let Err(e) = users_db_operations::update_last_login_time(&conn, user.id) {
        log::error!("Failed to record last login for user {}: {}", user.id, e);
    }
    log::info!("User '{}' logged in", user.username);

    let target = safe_next(Some(&login_data.next)).unwrap_or_else(|| profile_url(&user.username));
    redirect(&target)
}

fn render_registration(
    session: &Session,
    tera: &Tera,
    config: &Config,
    values: &RegistrationFormValues,
    errors: &FormErrors,
    csrf_token: &str,
) -> HttpResponse {
    let mut ctx = base_context(session, config);
    ctx.insert("form", values);
    ctx.insert("errors", errors);
    ctx.insert("csrf_token", csrf_token);
    render(tera, "registration/registration_form.html", &ctx)
}

async fn show_registration_form(
    session: Session,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    token: CsrfToken,
) -> impl Responder {
    let values = RegistrationFormValues {
        username: String::new(),
        email: String::new(),
        password1: String::new(),
        password2: String::new(),
    };
    render_registration(&session, &tera, &config, &values, &FormErrors::default(), token.get())
}

async fn handle_registration(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    form: Csrf<web::Form<RegistrationForm>>,
) -> impl Responder {
    let data = form.into_inner().into_inner();
    let values = RegistrationFormValues {
        username: data.username.trim().to_string(),
        email: data.email.trim().to_string(),
        password1: data.password1,
        password2: data.password2,
    };

    let mut conn = match get_conn(&pool) {
        Ok(c) => c,
        Err(response) => return response,
    };
    match values.validate(&conn) {
        Ok(Ok(())) => {}
        Ok(Err(errors)) => {
            return render_registration(&session, &tera, &config, &values, &errors, data.csrf_token.get())
        }
        Err(e) => return server_error("Failed to validate registration", e),
    }

    let new_user = NewUser { username: &values.username, email: &values.email, ..NewUser::default() };
    match users_db_operations::create_user(&mut conn, &new_user, &values.password1) {
        Ok(user_id) => {
            log::info!("Registered user '{}' with id {}", values.username, user_id);
            set_notification(&session, "Registration complete. You can now log in.", "success");
            redirect(LOGIN_PATH)
        }
        Err(e) => server_error("Failed to create user", e),
    }
}

async fn handle_logout(session: Session, _form: Csrf<web::Form<ConfirmForm>>) -> impl Responder {
    session.purge();
    redirect("/")
}
