pub mod health;
pub mod pdf;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    // Callers are trusted, so CORS stays wide open
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health_check))
        .route("/templates", get(health::list_templates))
        .route("/pdf", post(pdf::generate_pdf))
        .route("/pdfs", post(pdf::generate_pdfs))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
