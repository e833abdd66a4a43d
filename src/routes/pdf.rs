use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{Result, ServiceError};
use crate::models::{BatchResponse, FileMap, PdfResponse, RenderRequest, SingleFile};
use crate::pipeline::RenderJob;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TemplateQuery {
    pub template_key: Option<String>,
    pub template: Option<String>,
}

impl TemplateQuery {
    fn key(&self) -> Option<&str> {
        self.template_key.as_deref().or(self.template.as_deref())
    }
}

/// An empty body is an empty payload; anything else must be JSON.
fn parse_body(body: &Bytes) -> Result<RenderRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return RenderRequest::from_body(Value::Null);
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ServiceError::InvalidRequest(format!("malformed JSON body: {e}")))?;
    RenderRequest::from_body(value)
}

/// Render one template and return its signed link.
pub async fn generate_pdf(
    State(state): State<AppState>,
    query: std::result::Result<Query<TemplateQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<PdfResponse>> {
    let Query(query) = query
        .map_err(|e| ServiceError::InvalidRequest(format!("invalid query string: {e}")))?;
    let req = parse_body(&body)?;
    let pipeline = &state.pipeline;

    let key = pipeline.resolve_single(&req, query.key())?;
    let job = RenderJob::from_request(&req, Utc::now());
    info!(template_key = %key, job_id = %job.job_id, "Processing PDF request");

    let rendered = pipeline.render_one(key, &req.payload, &job).await?;

    Ok(Json(PdfResponse {
        ok: true,
        file: SingleFile {
            template_key: key,
            job_id: job.job_id,
            bucket: rendered.stored.bucket.clone(),
            file: rendered.file_entry(),
        },
    }))
}

/// Render several templates with one shared payload and job identity.
pub async fn generate_pdfs(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchResponse>> {
    let req = parse_body(&body)?;
    let pipeline = &state.pipeline;

    let keys = pipeline.resolve_batch(&req)?;
    let job = RenderJob::from_request(&req, Utc::now());
    info!(job_id = %job.job_id, templates = keys.len(), "Processing batch PDF request");

    let rendered = pipeline.render_batch(&keys, &req.payload, &job).await?;
    let files = FileMap(
        rendered
            .iter()
            .map(|r| (r.template_key, r.file_entry()))
            .collect(),
    );

    Ok(Json(BatchResponse {
        ok: true,
        job_id: job.job_id,
        bucket: pipeline.bucket().unwrap_or_default().to_string(),
        files,
    }))
}
