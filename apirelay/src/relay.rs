//! Outbound call to the remote API described by a config record

use crate::config::RelaySettings;
use crate::model::ConfigRecord;
use crate::observability::metrics::RelayMetrics;
use crate::observability::tracing::relay_span;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::path::Path;
use tracing::Instrument;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid method `{0}`")]
    InvalidMethod(String),
    #[error("invalid url `{0}`")]
    InvalidUrl(String),
    #[error("malformed headers: {0}")]
    MalformedHeaders(String),
    #[error("reading upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Stateless across calls; clone freely, the client pool is shared
#[derive(Debug, Clone)]
pub struct RemoteRelay {
    client: Client,
    file_field: String,
    strict_headers: bool,
}

impl RemoteRelay {
    pub fn new(settings: &RelaySettings) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            file_field: settings.file_field.clone(),
            strict_headers: settings.strict_headers,
        })
    }

    /// Send `file` to `config.url` and return the whole response body,
    /// whatever the upstream status was.
    pub async fn relay(
        &self,
        config: &ConfigRecord,
        file: &Path,
        file_name: &str,
    ) -> Result<Vec<u8>, RelayError> {
        let method = parse_method(&config.method)?;
        let span = relay_span(config.id, method.as_str(), &config.url);
        let metrics = RelayMetrics::start(method.as_str());
        let result = self
            .send(config, method.clone(), file, file_name)
            .instrument(span)
            .await;
        metrics.finish(result.is_ok());
        result
    }

    async fn send(
        &self,
        config: &ConfigRecord,
        method: Method,
        file: &Path,
        file_name: &str,
    ) -> Result<Vec<u8>, RelayError> {
        let url = reqwest::Url::parse(config.url.trim())
            .map_err(|_| RelayError::InvalidUrl(config.url.clone()))?;
        let headers = parse_headers(&config.headers, self.strict_headers)?;

        let carries_body = method != Method::GET && method != Method::HEAD;
        let mut request = self.client.request(method, url).headers(headers);

        if carries_body {
            let part = file_part(file, file_name).await?;
            request = request.multipart(Form::new().part(self.file_field.clone(), part));
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Remote call failed");
            RelayError::Transport(e)
        })?;

        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            tracing::info!(status = status.as_u16(), bytes = body.len(), "Remote call completed");
        } else {
            tracing::warn!(status = status.as_u16(), bytes = body.len(), "Remote returned non-success status");
        }
        Ok(body.to_vec())
    }
}

/// Streams the staged file instead of buffering it a second time
async fn file_part(path: &Path, file_name: &str) -> Result<Part, RelayError> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    Ok(Part::stream_with_length(reqwest::Body::from(file), len)
        .file_name(file_name.to_string())
        .mime_str("application/octet-stream")?)
}

fn parse_method(raw: &str) -> Result<Method, RelayError> {
    let upper = raw.trim().to_ascii_uppercase();
    Method::from_bytes(upper.as_bytes()).map_err(|_| RelayError::InvalidMethod(raw.to_string()))
}

/// Decode the stored `headers` text (a JSON object of strings).
///
/// Blank text means no headers. Undecodable text is an error only when
/// `strict`; otherwise it is logged and ignored. Entries that are not valid
/// HTTP header names or values are always skipped.
pub fn parse_headers(text: &str, strict: bool) -> Result<HeaderMap, RelayError> {
    let mut map = HeaderMap::new();
    if text.trim().is_empty() {
        return Ok(map);
    }

    let raw: HashMap<String, String> = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) if strict => return Err(RelayError::MalformedHeaders(e.to_string())),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed headers config");
            return Ok(map);
        }
    };

    for (name, value) in raw {
        let parsed = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        );
        match parsed {
            (Ok(n), Ok(v)) => {
                map.append(n, v);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid header"),
        }
    }
    Ok(map)
}
