use crate::middleware::AuthenticatedUser;
use actix_session::SessionExt;
use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::middleware::{ErrorHandlerResponse, ErrorHandlers};
use actix_web::{web, HttpResponse, Result};
use tera::{Context, Tera};

/// Replaces bare error statuses with the site's error pages.
pub fn error_handlers<B: 'static>() -> ErrorHandlers<B> {
    ErrorHandlers::new()
        .handler(StatusCode::NOT_FOUND, not_found)
        .handler(StatusCode::FORBIDDEN, csrf_failure)
        .handler(StatusCode::UNPROCESSABLE_ENTITY, csrf_failure)
        .handler(StatusCode::INTERNAL_SERVER_ERROR, server_error)
}

fn not_found<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render_error_page(res, "pages/404.html", StatusCode::NOT_FOUND)
}

/// Token rejections surface as 403 whatever status the CSRF layer chose.
fn csrf_failure<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render_error_page(res, "pages/403csrf.html", StatusCode::FORBIDDEN)
}

fn server_error<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render_error_page(res, "pages/500.html", StatusCode::INTERNAL_SERVER_ERROR)
}

fn render_error_page<B>(res: ServiceResponse<B>, template: &str, status: StatusCode) -> Result<ErrorHandlerResponse<B>> {
    let request = res.request();
    if let Some(err) = res.response().error() {
        log::warn!("{} {} -> {}: {}", request.method(), request.path(), status, err);
    }

    let mut ctx = Context::new();
    ctx.insert("current_user", &AuthenticatedUser::from_session(&request.get_session()));
    ctx.insert("request_path", request.path());

    let body = match request.app_data::<web::Data<Tera>>() {
        Some(tera) => match tera.render(template, &ctx) {
            Ok(rendered) => rendered,
            Err(err) => {
                log::error!("Template rendering error in '{}': {:?}", template, err);
                status.canonical_reason().unwrap_or("Error").to_string()
            }
        },
        None => status.canonical_reason().unwrap_or("Error").to_string(),
    };

    let (req, _) = res.into_parts();
    let response = HttpResponse::build(status)
        .insert_header((header::CONTENT_TYPE, "text/html; charset=utf-8"))
        .body(body);
    Ok(ErrorHandlerResponse::Response(ServiceResponse::new(req, response).map_into_right_body()))
}
