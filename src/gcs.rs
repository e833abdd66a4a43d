use crate::config::StorageConfig;
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::upload::{UploadObjectRequest, UploadType};
use google_cloud_storage::http::objects::Object;
use google_cloud_storage::sign::{SignedURLMethod, SignedURLOptions};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

const PDF_CONTENT_TYPE: &str = "application/pdf";
const NO_CACHE: &str = "no-cache";

/// A PDF that has been persisted and can be fetched through `url` until it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub object_name: String,
    pub gcs_path: String,
    pub url: String,
    pub file_size: u64,
    pub sha256_checksum: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Target bucket, if one is configured.
    fn bucket(&self) -> Option<&str>;

    async fn upload_pdf(&self, data: Vec<u8>, object_name: &str) -> Result<StoredObject>;
}

#[derive(Clone)]
pub struct DocumentStorage {
    client: GcsClient,
    bucket: Option<String>,
    signed_url_expiry: Duration,
}

impl DocumentStorage {
    /// Initialise from ambient Google credentials. Without credentials the client
    /// still starts, so health checks answer and uploads report the failure.
    pub async fn new(config: &StorageConfig) -> Self {
        let client_config = match ClientConfig::default().with_auth().await {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, "No GCS credentials found, uploads will fail");
                ClientConfig::default().anonymous()
            }
        };

        Self::with_client(GcsClient::new(client_config), config)
    }

    pub fn with_client(client: GcsClient, config: &StorageConfig) -> Self {
        if config.bucket().is_none() {
            warn!("GCS_BUCKET is not set, uploads will fail");
        }

        Self {
            client,
            bucket: config.bucket().map(str::to_string),
            signed_url_expiry: config.signed_url_expiry(),
        }
    }

    fn require_bucket(&self) -> Result<&str> {
        self.bucket.as_deref().ok_or_else(|| {
            ServiceError::StorageConfig("GCS_BUCKET is not set".to_string())
        })
    }

    /// Generate a signed URL for downloading an artifact.
    #[instrument(skip(self))]
    pub async fn generate_signed_url(&self, bucket: &str, object_name: &str) -> Result<String> {
        self.client
            .signed_url(
                bucket,
                object_name,
                None,
                None,
                SignedURLOptions {
                    method: SignedURLMethod::GET,
                    expires: self.signed_url_expiry,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                ServiceError::Storage(format!("Failed to sign URL for {object_name}: {e}"))
            })
    }
}

#[async_trait]
impl ObjectStore for DocumentStorage {
    fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Single-shot upload, then sign a read URL for the new object.
    #[instrument(skip(self, data))]
    async fn upload_pdf(&self, data: Vec<u8>, object_name: &str) -> Result<StoredObject> {
        let bucket = self.require_bucket()?;
        let file_size = data.len() as u64;

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let sha256_checksum = hex::encode(hasher.finalize());

        let upload_type = UploadType::Multipart(Box::new(Object {
            name: object_name.to_string(),
            content_type: Some(PDF_CONTENT_TYPE.to_string()),
            cache_control: Some(NO_CACHE.to_string()),
            metadata: Some(HashMap::from([(
                "sha256".to_string(),
                sha256_checksum.clone(),
            )])),
            ..Default::default()
        }));

        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: bucket.to_string(),
                    ..Default::default()
                },
                data,
                &upload_type,
            )
            .await
            .map_err(|e| {
                ServiceError::Storage(format!("Failed to upload {object_name} to {bucket}: {e}"))
            })?;

        let gcs_path = format!("gs://{bucket}/{object_name}");
        info!(
            gcs_path = %gcs_path,
            file_size = file_size,
            sha256 = %sha256_checksum,
            "Uploaded PDF to GCS"
        );

        let url = self.generate_signed_url(bucket, object_name).await?;

        Ok(StoredObject {
            bucket: bucket.to_string(),
            object_name: object_name.to_string(),
            gcs_path,
            url,
            file_size,
            sha256_checksum,
        })
    }
}

// ============================================================
// Object naming
// ============================================================

/// Lowercase slug: alphanumeric runs joined by single dashes.
pub fn sanitize_segment(raw: &str, fallback: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;

    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// Keep only characters that are safe inside an object name segment.
pub fn sanitize_job_id(raw: &str) -> Option<String> {
    let id: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    (!id.is_empty()).then_some(id)
}

/// Drop empty, `.` and `..` segments and surrounding slashes.
pub fn normalize_prefix(raw: &str) -> Option<String> {
    let prefix = raw
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join("/");

    (!prefix.is_empty()).then_some(prefix)
}

/// `pdfs/<UTC timestamp>_<job id>`
pub fn default_prefix(job_id: &str, now: DateTime<Utc>) -> String {
    format!("pdfs/{}_{}", now.format("%Y%m%dT%H%M%SZ"), job_id)
}

/// `<template key>_<client slug>_<job id>.pdf`
pub fn object_file_name(template_key: &str, client_slug: &str, job_id: &str) -> String {
    format!("{template_key}_{client_slug}_{job_id}.pdf")
}

pub fn object_name(prefix: &str, file_name: &str) -> String {
    format!("{prefix}/{file_name}")
}
