use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use overtake::models::HealthResponse;

use crate::AppState;

/// Health check endpoint
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let response = HealthResponse {
        status: match (&state.context, &state.load_error) {
            (Some(_), _) => "ok".to_string(),
            (None, Some(_)) => "error".to_string(),
            (None, None) => "not_ready".to_string(),
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.context.is_some(),
    };

    HttpResponse::Ok().json(response)
}
