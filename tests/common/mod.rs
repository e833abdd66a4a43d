#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use plan_pdf_service::error::{Result, ServiceError};
use plan_pdf_service::gcs::{ObjectStore, StoredObject};
use plan_pdf_service::pipeline::DocumentPipeline;
use plan_pdf_service::renderers::PdfRenderer;
use plan_pdf_service::routes;
use plan_pdf_service::state::AppState;
use plan_pdf_service::templates::TemplateStore;
use serde_json::Value;
use tower::ServiceExt;

pub const SERVICE_NAME: &str = "plan-pdf-service-test";

/// Echoes the rendered HTML back as the "PDF" so tests can inspect substitution.
#[derive(Default)]
pub struct FakeRenderer {
    pub rendered: Mutex<Vec<String>>,
    pub fail_on_call: Option<usize>,
}

#[async_trait]
impl PdfRenderer for FakeRenderer {
    async fn to_pdf(&self, html: &str) -> Result<Vec<u8>> {
        let mut rendered = self.rendered.lock().unwrap();
        if self.fail_on_call == Some(rendered.len()) {
            return Err(ServiceError::Render("browser crashed".to_string()));
        }
        rendered.push(html.to_string());
        Ok(format!("%PDF-fake\n{html}").into_bytes())
    }
}

pub struct FakeStore {
    pub bucket: Option<String>,
    pub uploads: Mutex<Vec<(String, usize)>>,
}

impl FakeStore {
    pub fn new(bucket: Option<&str>) -> Self {
        Self {
            bucket: bucket.map(str::to_string),
            uploads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    async fn upload_pdf(&self, data: Vec<u8>, object_name: &str) -> Result<StoredObject> {
        let bucket = self
            .bucket
            .clone()
            .ok_or_else(|| ServiceError::StorageConfig("GCS_BUCKET is not set".to_string()))?;

        self.uploads
            .lock()
            .unwrap()
            .push((object_name.to_string(), data.len()));

        Ok(StoredObject {
            gcs_path: format!("gs://{bucket}/{object_name}"),
            url: format!("https://storage.example.com/{bucket}/{object_name}?X-Goog-Signature=abc"),
            bucket,
            object_name: object_name.to_string(),
            file_size: data.len() as u64,
            sha256_checksum: "0".repeat(64),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub renderer: Arc<FakeRenderer>,
    pub store: Arc<FakeStore>,
}

pub fn templates_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates")
}

pub fn test_app(renderer: FakeRenderer, store: FakeStore) -> TestApp {
    let renderer = Arc::new(renderer);
    let store = Arc::new(store);
    let pipeline = DocumentPipeline::new(
        TemplateStore::new(templates_dir()),
        renderer.clone(),
        store.clone(),
    );

    TestApp {
        router: routes::router(AppState::new(SERVICE_NAME, pipeline)),
        renderer,
        store,
    }
}

pub fn default_app() -> TestApp {
    test_app(FakeRenderer::default(), FakeStore::new(Some("plans-bucket")))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub text: String,
    pub json: Value,
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let json = serde_json::from_str(&text).unwrap_or(Value::Null);

    TestResponse { status, text, json }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

pub async fn post_raw(router: &Router, uri: &str, body: impl Into<Body>) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    send(router, request).await
}

pub async fn post_json(router: &Router, uri: &str, body: Value) -> TestResponse {
    post_raw(router, uri, body.to_string()).await
}
