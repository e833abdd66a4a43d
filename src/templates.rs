// plan-pdf-service/src/templates.rs

use crate::error::{Result, ServiceError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// The fixed catalog of HTML templates shipped with the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKey {
    MealFirst,
    MealWeekly,
    WorkoutFirst,
    WorkoutWeekly,
    BundleFirst,
    BundleWeekly,
}

impl TemplateKey {
    /// Enumeration order; batch requests without explicit keys follow it.
    pub const ALL: [TemplateKey; 6] = [
        TemplateKey::MealFirst,
        TemplateKey::MealWeekly,
        TemplateKey::WorkoutFirst,
        TemplateKey::WorkoutWeekly,
        TemplateKey::BundleFirst,
        TemplateKey::BundleWeekly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKey::MealFirst => "meal_first",
            TemplateKey::MealWeekly => "meal_weekly",
            TemplateKey::WorkoutFirst => "workout_first",
            TemplateKey::WorkoutWeekly => "workout_weekly",
            TemplateKey::BundleFirst => "bundle_first",
            TemplateKey::BundleWeekly => "bundle_weekly",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    pub fn file_name(&self) -> String {
        format!("{}.html", self.as_str())
    }

    pub fn allowed() -> Vec<String> {
        Self::ALL.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps template keys to HTML files under a single directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn keys(&self) -> &'static [TemplateKey] {
        &TemplateKey::ALL
    }

    /// Parse a caller-supplied key, rejecting anything outside the catalog.
    pub fn key(&self, key: &str) -> Result<TemplateKey> {
        TemplateKey::parse(key).ok_or_else(|| ServiceError::UnknownTemplate {
            key: key.to_string(),
            allowed: TemplateKey::allowed(),
        })
    }

    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        let key = self.key(key)?;
        Ok(self.path_for(key))
    }

    pub fn path_for(&self, key: TemplateKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Read the template body from disk. Not cached, so edits are picked up per request.
    pub async fn load(&self, key: TemplateKey) -> Result<String> {
        let path = self.path_for(key);
        debug!(template_key = %key, path = %path.display(), "Loading template");

        fs::read_to_string(&path)
            .await
            .map_err(|source| ServiceError::TemplateIo {
                key: key.to_string(),
                source,
            })
    }
}
