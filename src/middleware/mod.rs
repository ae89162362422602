use crate::models::User;
use actix_session::{Session, SessionExt, SessionInsertError};
use actix_web::{dev, error::InternalError, FromRequest, HttpRequest, HttpResponse};
use serde::Serialize;
use std::future::{ready, Ready};
use url::form_urlencoded;

pub mod error_pages;

pub const LOGIN_PATH: &str = "/auth/login";

/// The logged-in account as recorded in the session cookie.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
}

impl AuthenticatedUser {
    pub fn from_session(session: &Session) -> Option<Self> {
        match (session.get::<i64>("user_id"), session.get::<String>("username")) {
            (Ok(Some(id)), Ok(Some(username))) => {
                let is_staff = session.get::<bool>("is_staff").ok().flatten().unwrap_or(false);
                Some(AuthenticatedUser { id, username, is_staff })
            }
            _ => None,
        }
    }
}

/// Anonymous requests are turned away with a redirect to the login page.
impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        match AuthenticatedUser::from_session(&req.get_session()) {
            Some(user) => ready(Ok(user)),
            None => ready(Err(InternalError::from_response("Login required.", login_redirect(req)).into())),
        }
    }
}

pub fn login_redirect(req: &HttpRequest) -> HttpResponse {
    let next = match req.uri().path_and_query() {
        Some(pq) => pq.as_str().to_string(),
        None => req.path().to_string(),
    };
    let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    HttpResponse::Found()
        .append_header(("location", format!("{}?next={}", LOGIN_PATH, encoded)))
        .finish()
}

/// Starts a fresh session for `user`, discarding anything from before login.
pub fn start_session(session: &Session, user: &User) -> Result<(), SessionInsertError> {
    session.renew();
    session.insert("user_id", user.id)?;
    session.insert("username", &user.username)?;
    session.insert("is_staff", user.is_staff)?;
    Ok(())
}

pub fn staff_guard(session: &Session) -> bool {
    session.get::<bool>("is_staff").unwrap_or(None) == Some(true)
        && session.get::<i64>("user_id").unwrap_or(None).is_some()
}

/// Only same-site absolute paths are followed after login.
pub fn safe_next(next: Option<&str>) -> Option<String> {
    let next = next?.trim();
    let is_local = next.starts_with('/') && !next.starts_with("//") && !next.contains('\\');
    is_local.then(|| next.to_string())
}

/// Multipart bodies bypass the form extractor, so the double-submit check is
/// repeated here against the token cookie.
pub fn multipart_csrf_ok(req: &HttpRequest, submitted: Option<&str>) -> bool {
    let Some(submitted) = submitted.filter(|t| !t.is_empty()) else {
        return false;
    };
    match req.cookies() {
        Ok(cookies) => cookies
            .iter()
            .any(|cookie| cookie.name().ends_with("Csrf-Token") && cookie.value() == submitted),
        Err(e) => {
            log::warn!("Could not parse request cookies for CSRF check: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    #[test]
    fn next_must_stay_on_site() {
        assert_eq!(safe_next(Some("/posts/3")), Some("/posts/3".to_string()));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(Some("/\\evil")), None);
        assert_eq!(safe_next(None), None);
    }

    #[test]
    fn login_redirect_carries_encoded_next() {
        let req = TestRequest::with_uri("/posts/5/edit?x=1").to_http_request();
        let res = login_redirect(&req);
        assert_eq!(res.status(), actix_web::http::StatusCode::FOUND);
        let location = res.headers().get("location").unwrap().to_str().unwrap();
        assert_eq!(location, "/auth/login?next=%2Fposts%2F5%2Fedit%3Fx%3D1");
    }

    #[test]
    fn multipart_token_must_match_cookie() {
        let req = TestRequest::default()
            .cookie(Cookie::new("Csrf-Token", "abc123"))
            .to_http_request();
        assert!(multipart_csrf_ok(&req, Some("abc123")));
        assert!(!multipart_csrf_ok(&req, Some("other")));
        assert!(!multipart_csrf_ok(&req, None));

        let bare = TestRequest::default().to_http_request();
        assert!(!multipart_csrf_ok(&bare, Some("abc123")));
    }
}
