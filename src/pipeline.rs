use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Result, ServiceError};
use crate::gcs::{
    default_prefix, normalize_prefix, object_file_name, object_name, sanitize_job_id,
    sanitize_segment, ObjectStore, StoredObject,
};
use crate::models::{FileEntry, Payload, RenderRequest};
use crate::renderers::{HtmlRenderer, PdfRenderer};
use crate::templates::{TemplateKey, TemplateStore};

const CLIENT_FALLBACK: &str = "client";

/// Identity and object layout shared by every template rendered for one request.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub job_id: String,
    pub prefix: String,
    pub client_slug: String,
    pub created_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn from_request(req: &RenderRequest, now: DateTime<Utc>) -> Self {
        let job_id = req
            .job_id
            .as_deref()
            .and_then(sanitize_job_id)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        // Caller-supplied prefix and job_id may collide with an earlier job; the
        // upload then replaces that object.
        let prefix = req
            .prefix
            .as_deref()
            .and_then(normalize_prefix)
            .unwrap_or_else(|| default_prefix(&job_id, now));

        let client_slug =
            sanitize_segment(req.client_name.as_deref().unwrap_or(""), CLIENT_FALLBACK);

        Self {
            job_id,
            prefix,
            client_slug,
            created_at: now,
        }
    }

    pub fn file_name(&self, key: TemplateKey) -> String {
        object_file_name(key.as_str(), &self.client_slug, &self.job_id)
    }

    pub fn object_name(&self, key: TemplateKey) -> String {
        object_name(&self.prefix, &self.file_name(key))
    }

    /// Payload as the templates see it. `job_id` always carries the resolved id
    /// so the document matches its object name; `generated_at` is only filled
    /// when the caller left it out.
    pub fn template_fields(&self, payload: &Payload) -> Payload {
        let mut fields = payload.clone();
        fields.insert("job_id".to_string(), Value::String(self.job_id.clone()));

        if fields.get("generated_at").map_or(true, Value::is_null) {
            fields.insert(
                "generated_at".to_string(),
                Value::String(self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        fields
    }
}

/// One uploaded template output.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub template_key: TemplateKey,
    pub file_name: String,
    pub stored: StoredObject,
}

impl RenderedPdf {
    pub fn file_entry(&self) -> FileEntry {
        FileEntry {
            file_name: self.file_name.clone(),
            object_name: self.stored.object_name.clone(),
            gcs_path: self.stored.gcs_path.clone(),
            url: self.stored.url.clone(),
        }
    }
}

/// Orchestrates: load template → substitute → print PDF → upload → sign.
pub struct DocumentPipeline {
    templates: TemplateStore,
    html: HtmlRenderer,
    pdf: Arc<dyn PdfRenderer>,
    storage: Arc<dyn ObjectStore>,
}

impl DocumentPipeline {
    pub fn new(
        templates: TemplateStore,
        pdf: Arc<dyn PdfRenderer>,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            templates,
            html: HtmlRenderer::new(),
            pdf,
            storage,
        }
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn bucket(&self) -> Option<&str> {
        self.storage.bucket()
    }

    pub async fn shutdown(&self) {
        self.pdf.shutdown().await;
    }

    /// Body `template_key` wins over the query-string value.
    pub fn resolve_single(
        &self,
        req: &RenderRequest,
        query_key: Option<&str>,
    ) -> Result<TemplateKey> {
        let key = req
            .template_key
            .as_deref()
            .or(query_key.map(str::trim).filter(|k| !k.is_empty()))
            .ok_or_else(|| ServiceError::MissingTemplateKey {
                allowed: TemplateKey::allowed(),
            })?;

        self.templates.key(key)
    }

    /// Requested keys in request order without repeats, or the whole catalog.
    pub fn resolve_batch(&self, req: &RenderRequest) -> Result<Vec<TemplateKey>> {
        let Some(requested) = &req.template_keys else {
            return Ok(self.templates.keys().to_vec());
        };

        let mut keys = Vec::with_capacity(requested.len());
        for raw in requested {
            let key = self.templates.key(raw)?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn ensure_storage(&self) -> Result<()> {
        match self.storage.bucket() {
            Some(_) => Ok(()),
            None => Err(ServiceError::StorageConfig("GCS_BUCKET is not set".to_string())),
        }
    }

    #[instrument(skip(self, payload, job), fields(template_key = %key, job_id = %job.job_id))]
    pub async fn render_one(
        &self,
        key: TemplateKey,
        payload: &Payload,
        job: &RenderJob,
    ) -> Result<RenderedPdf> {
        self.ensure_storage()?;
        let start = Instant::now();

        let template = self.templates.load(key).await?;
        let html = self.html.render(&template, &job.template_fields(payload));
        let pdf = self.pdf.to_pdf(&html).await?;

        let file_name = job.file_name(key);
        let stored = self
            .storage
            .upload_pdf(pdf, &job.object_name(key))
            .await?;

        info!(
            object_name = %stored.object_name,
            file_size = stored.file_size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Rendered template"
        );

        Ok(RenderedPdf {
            template_key: key,
            file_name,
            stored,
        })
    }

    /// Sequential, in order; the first failure aborts the whole batch.
    #[instrument(skip(self, payload, job), fields(job_id = %job.job_id, templates = keys.len()))]
    pub async fn render_batch(
        &self,
        keys: &[TemplateKey],
        payload: &Payload,
        job: &RenderJob,
    ) -> Result<Vec<RenderedPdf>> {
        self.ensure_storage()?;

        let mut rendered = Vec::with_capacity(keys.len());
        for key in keys {
            rendered.push(self.render_one(*key, payload, job).await?);
        }

        info!(artifacts = rendered.len(), "Batch rendered successfully");
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn request(body: serde_json::Value) -> RenderRequest {
        RenderRequest::from_body(body).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap()
    }

    #[test]
    fn job_uses_caller_identity_when_given() {
        let job = RenderJob::from_request(
            &request(json!({"job_id": "abc123", "client_name": "Jane Doe"})),
            now(),
        );

        assert_eq!(job.job_id, "abc123");
        assert_eq!(job.prefix, "pdfs/20240305T093000Z_abc123");
        assert_eq!(job.file_name(TemplateKey::MealFirst), "meal_first_jane-doe_abc123.pdf");
        assert_eq!(
            job.object_name(TemplateKey::MealFirst),
            "pdfs/20240305T093000Z_abc123/meal_first_jane-doe_abc123.pdf"
        );
    }

    #[test]
    fn job_generates_identity_otherwise() {
        let a = RenderJob::from_request(&request(json!({})), now());
        let b = RenderJob::from_request(&request(json!({})), now());

        assert_eq!(a.job_id.len(), 32);
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.client_slug, "client");
    }

    #[test]
    fn template_fields_carry_job_identity() {
        let job = RenderJob::from_request(&request(json!({"job_id": "ab/c"})), now());
        let fields = job.template_fields(&request(json!({"job_id": "ab/c", "kcal": 1})).payload);

        assert_eq!(fields["job_id"], json!("abc"));
        assert_eq!(fields["generated_at"], json!("2024-03-05T09:30:00Z"));
        assert_eq!(fields["kcal"], json!(1));
    }

    #[test]
    fn caller_generated_at_is_kept() {
        let job = RenderJob::from_request(&request(json!({})), now());

        let fields = job.template_fields(&request(json!({"generated_at": "2023-01-02"})).payload);
        assert_eq!(fields["generated_at"], json!("2023-01-02"));

        let fields = job.template_fields(&request(json!({"generated_at": null})).payload);
        assert_eq!(fields["generated_at"], json!("2024-03-05T09:30:00Z"));
    }

    #[test]
    fn custom_prefix_is_normalized() {
        let job = RenderJob::from_request(
            &request(json!({"prefix": "/clients/jane/", "job_id": "j1"})),
            now(),
        );
        assert_eq!(
            job.object_name(TemplateKey::BundleWeekly),
            "clients/jane/bundle_weekly_client_j1.pdf"
        );
    }
}
