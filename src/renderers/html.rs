// plan-pdf-service/src/renderers/html.rs

use crate::models::Payload;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// `{{ field }}` or `{{ field | date: "pattern" }}`. Both forms share one scan
/// so a substituted value is never rescanned for placeholders.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\{\{\s*([A-Za-z0-9_.\-]+)\s*(?:\|\s*date\s*:\s*(?:"([^"]*)"|'([^']*)')\s*)?\}\}"#,
    )
    .expect("placeholder pattern is valid")
});

const LONG_DATE_PATTERNS: [&str; 3] = ["%B %d, %Y", "MMMM dd, yyyy", "MMMM DD, YYYY"];

/// Plain textual placeholder substitution. No escaping, loops or partials.
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, template: &str, payload: &Payload) -> String {
        let mut replaced = 0usize;
        let html = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            replaced += 1;
            let value = payload.get(&caps[1]);
            match caps.get(2).or_else(|| caps.get(3)) {
                Some(pattern) => format_date_value(value, pattern.as_str()),
                None => stringify(value),
            }
        });

        debug!(placeholders = replaced, size_kb = html.len() / 1024, "Substituted template");
        html.into_owned()
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn format_date_value(value: Option<&Value>, pattern: &str) -> String {
    let Some(date) = value.and_then(coerce_date) else {
        return stringify(value);
    };

    if LONG_DATE_PATTERNS.contains(&pattern.trim()) {
        date.format("%B %d, %Y").to_string()
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}

fn coerce_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date(s.trim()),
        // Numbers are epoch milliseconds
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    None
}
