use axum::extract::State;
use axum::Json;

use crate::models::{HealthResponse, ServiceInfo, TemplatesResponse};
use crate::state::AppState;

pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        ok: true,
        service: state.service_name.clone(),
    })
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// Lists the template catalog in enumeration order.
pub async fn list_templates(State(state): State<AppState>) -> Json<TemplatesResponse> {
    let template_keys = state
        .pipeline
        .templates()
        .keys()
        .iter()
        .map(|k| k.as_str())
        .collect();

    Json(TemplatesResponse {
        ok: true,
        template_keys,
    })
}
