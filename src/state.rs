use std::sync::Arc;

use crate::pipeline::DocumentPipeline;

/// Shared application state, injected into all route handlers via Axum state.
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub pipeline: Arc<DocumentPipeline>,
}

impl AppState {
    pub fn new(service_name: impl Into<String>, pipeline: DocumentPipeline) -> Self {
        Self {
            service_name: service_name.into(),
            pipeline: Arc::new(pipeline),
        }
    }
}
