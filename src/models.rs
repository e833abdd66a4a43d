// plan-pdf-service/src/models.rs

use crate::error::{Result, ServiceError};
use crate::templates::TemplateKey;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Flat substitution values supplied by the caller.
pub type Payload = Map<String, Value>;

/// Control fields pulled out of a request body. The full body stays
/// available to templates as the payload.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub template_key: Option<String>,
    pub template_keys: Option<Vec<String>>,
    pub client_name: Option<String>,
    pub job_id: Option<String>,
    pub prefix: Option<String>,
    pub payload: Payload,
}

impl RenderRequest {
    pub fn from_body(body: Value) -> Result<Self> {
        let payload = match body {
            Value::Object(map) => map,
            Value::Null => Payload::new(),
            other => {
                return Err(ServiceError::InvalidRequest(format!(
                    "request body must be a JSON object, got {}",
                    json_type(&other)
                )))
            }
        };

        Ok(Self {
            template_key: text_field(&payload, "template_key"),
            template_keys: list_field(&payload, "template_keys")?,
            client_name: ["client_name", "name", "client"]
                .into_iter()
                .find_map(|field| text_field(&payload, field)),
            job_id: text_field(&payload, "job_id"),
            prefix: text_field(&payload, "prefix"),
            payload,
        })
    }
}

fn text_field(payload: &Payload, field: &str) -> Option<String> {
    let text = match payload.get(field)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Accepts either a JSON array of strings or a comma-separated string.
fn list_field(payload: &Payload, field: &str) -> Result<Option<Vec<String>>> {
    let items: Vec<String> = match payload.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.split(',').map(|k| k.trim().to_string()).collect(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(ServiceError::InvalidRequest(format!(
                    "{field} entries must be strings, got {}",
                    json_type(other)
                ))),
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(ServiceError::InvalidRequest(format!(
                "{field} must be an array of strings, got {}",
                json_type(other)
            )))
        }
    };

    let items: Vec<String> = items.into_iter().filter(|k| !k.is_empty()).collect();
    Ok((!items.is_empty()).then_some(items))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================
// Responses
// ============================================================

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub ok: bool,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub ok: bool,
    pub template_keys: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub file_name: String,
    pub object_name: String,
    pub gcs_path: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SingleFile {
    pub template_key: TemplateKey,
    pub job_id: String,
    pub bucket: String,
    #[serde(flatten)]
    pub file: FileEntry,
}

#[derive(Debug, Serialize)]
pub struct PdfResponse {
    pub ok: bool,
    pub file: SingleFile,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub ok: bool,
    pub job_id: String,
    pub bucket: String,
    pub files: FileMap,
}

/// Template outputs keyed by template, serialized in processing order.
#[derive(Debug, Default)]
pub struct FileMap(pub Vec<(TemplateKey, FileEntry)>);

impl Serialize for FileMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, file) in &self.0 {
            map.serialize_entry(key.as_str(), file)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn control_fields_are_extracted_and_payload_kept() {
        let req = RenderRequest::from_body(json!({
            "template_key": " meal_first ",
            "client_name": "Jane Doe",
            "job_id": 42,
            "kcal": 2000
        }))
        .unwrap();

        assert_eq!(req.template_key.as_deref(), Some("meal_first"));
        assert_eq!(req.client_name.as_deref(), Some("Jane Doe"));
        assert_eq!(req.job_id.as_deref(), Some("42"));
        assert_eq!(req.payload.get("kcal"), Some(&json!(2000)));
        assert_eq!(req.payload.get("template_key"), Some(&json!(" meal_first ")));
    }

    #[test]
    fn client_name_falls_back_to_name() {
        let req = RenderRequest::from_body(json!({"name": "Ann"})).unwrap();
        assert_eq!(req.client_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn template_keys_accept_arrays_and_csv() {
        let req = RenderRequest::from_body(json!({"template_keys": ["a", " b ", ""]})).unwrap();
        assert_eq!(req.template_keys, Some(vec!["a".to_string(), "b".to_string()]));

        let req = RenderRequest::from_body(json!({"template_keys": "a, b"})).unwrap();
        assert_eq!(req.template_keys, Some(vec!["a".to_string(), "b".to_string()]));

        let req = RenderRequest::from_body(json!({"template_keys": []})).unwrap();
        assert_eq!(req.template_keys, None);
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        for body in [json!([1, 2]), json!("x"), json!({"template_keys": 5})] {
            let err = RenderRequest::from_body(body).unwrap_err();
            assert_eq!(err.error_type(), "invalid_request");
        }
    }

    #[test]
    fn file_map_preserves_order() {
        let entry = |name: &str| FileEntry {
            file_name: name.to_string(),
            object_name: format!("p/{name}"),
            gcs_path: format!("gs://b/p/{name}"),
            url: "https://signed".to_string(),
        };
        let files = FileMap(vec![
            (TemplateKey::WorkoutFirst, entry("w.pdf")),
            (TemplateKey::MealFirst, entry("m.pdf")),
        ]);

        let text = serde_json::to_string(&files).unwrap();
        let workout = text.find("workout_first").unwrap();
        let meal = text.find("meal_first").unwrap();
        assert!(workout < meal);
        assert!(text.contains("\"fileName\":\"w.pdf\""));
        assert!(text.contains("\"gcsPath\":\"gs://b/p/w.pdf\""));
    }
}
