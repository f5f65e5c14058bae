//! Config record and the payloads that create or modify it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored API relay configuration (row of `api_configs`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub method: String,
    pub parameters: String,
    pub request_body: String,
    pub headers: String,
    pub response_rule: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/add`. The JSON-text fields are kept exactly as sent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConfig {
    pub name: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub request_body: String,
    #[serde(default)]
    pub headers: String,
    #[serde(default)]
    pub response_rule: String,
}

impl NewConfig {
    /// name, url and method must be non-blank
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("name is required");
        }
        if self.url.trim().is_empty() {
            return Err("url is required");
        }
        if self.method.trim().is_empty() {
            return Err("method is required");
        }
        Ok(())
    }
}

/// Body of `POST /api/edit`: `None` keeps the stored value, `Some("")` clears it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub id: i64,
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub parameters: Option<String>,
    pub request_body: Option<String>,
    pub headers: Option<String>,
    pub response_rule: Option<String>,
}

impl ConfigPatch {
    /// Supplied fields as (column, value) pairs, in table order
    pub fn assignments(&self) -> Vec<(&'static str, &str)> {
        [
            ("name", &self.name),
            ("url", &self.url),
            ("method", &self.method),
            ("parameters", &self.parameters),
            ("request_body", &self.request_body),
            ("headers", &self.headers),
            ("response_rule", &self.response_rule),
        ]
        .into_iter()
        .filter_map(|(col, v)| v.as_deref().map(|v| (col, v)))
        .collect()
    }
}

/// Body of `POST /api/delete`
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub id: i64,
}
