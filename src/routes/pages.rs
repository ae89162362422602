use crate::config::Config;
use crate::routes::{base_context, render};
use actix_csrf::extractor::CsrfToken;
use actix_session::Session;
use actix_web::{web, Responder};
use tera::Tera;

pub fn config_pages(cfg: &mut web::ServiceConfig) {
    cfg.route("/pages/about", web::get().to(about))
        .route("/pages/rules", web::get().to(rules));
}

async fn about(session: Session, tera: web::Data<Tera>, config: web::Data<Config>, token: CsrfToken) -> impl Responder {
    let mut ctx = base_context(&session, &config);
    ctx.insert("csrf_token", token.get());
    render(&tera, "pages/about.html", &ctx)
}

async fn rules(session: Session, tera: web::Data<Tera>, config: web::Data<Config>, token: CsrfToken) -> impl Responder {
    let mut ctx = base_context(&session, &config);
    ctx.insert("csrf_token", token.get());
    render(&tera, "pages/rules.html", &ctx)
}
