use crate::domain::certification::CertificationRequest;
use crate::domain::error::AppError;
use crate::domain::template::ParameterSpec;
use crate::interfaces::state::AppState;
use actix_cors::Cors;
use actix_web::{
    dev::Server, error::InternalError, get, post, web, App, HttpResponse, HttpServer, Responder,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct HttpState {
    pub app_state: Arc<AppState>,
}

#[derive(Serialize)]
pub struct TemplateSummary<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub scopes: &'a [String],
    pub parameters: &'a [ParameterSpec],
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub templates: usize,
    pub pending_audits: usize,
    pub audit_sink: &'static str,
}

#[post("/certify")]
async fn certify(
    data: web::Data<HttpState>,
    req: web::Json<CertificationRequest>,
) -> impl Responder {
    match data.app_state.gateway.certify(req.into_inner()).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => internal_error_response(&e),
    }
}

#[get("/templates")]
async fn list_templates(data: web::Data<HttpState>) -> impl Responder {
    let templates: Vec<TemplateSummary<'_>> = data
        .app_state
        .registry
        .iter()
        .map(|t| TemplateSummary {
            id: t.id(),
            name: t.name(),
            description: t.description(),
            scopes: t.scopes(),
            parameters: t.parameters(),
        })
        .collect();

    HttpResponse::Ok().json(templates)
}

#[get("/health")]
async fn health(data: web::Data<HttpState>) -> impl Responder {
    let state = &data.app_state;
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        templates: state.registry.len(),
        pending_audits: state.audit.pending_count(),
        audit_sink: state.audit.sink_name(),
    })
}

/// Internal faults only; denials are ordinary 200 responses.
fn internal_error_response(err: &AppError) -> HttpResponse {
    error!("Certification failed internally: {}", err);
    HttpResponse::InternalServerError().json(json!({
        "approved": false,
        "error": "Internal error while certifying request",
        "error_code": "internal_error"
    }))
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            warn!("Rejected malformed certify body: {}", err);
            let response = HttpResponse::BadRequest().json(json!({
                "approved": false,
                "error": format!("Invalid request body: {}", err),
                "error_code": "invalid_request"
            }));
            InternalError::from_response(err, response).into()
        })
}

/// Routes under `/api`, shared by the server and handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .service(certify)
            .service(list_templates)
            .service(health),
    );
}

pub fn start_server(app_state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<Server> {
    let state = web::Data::new(HttpState { app_state });

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((host, port))?
    .run();

    info!(host, port, "HTTP server listening");
    Ok(server)
}
