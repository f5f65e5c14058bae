//! `{code, message, data}` envelope shared by every endpoint

use crate::error::AppError;
use crate::http_body_util::Full;
use crate::hyper::body::Bytes;
use crate::hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: u16,
    pub message: String,
    pub data: Value,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data,
        }
    }

    /// `code` mirrors the HTTP status; only the stable message is exposed
    pub fn from_error(err: &AppError) -> Self {
        Self {
            code: err.status().as_u16(),
            message: err.public_message().to_string(),
            data: Value::Null,
        }
    }
}

/// Create a JSON response
pub fn create_json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Full::new(Bytes::from("Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

pub fn envelope_response(status: StatusCode, envelope: &Envelope) -> Response<Full<Bytes>> {
    match serde_json::to_string(envelope) {
        Ok(body) => create_json_response(status, body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize envelope");
            create_json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"code":500,"message":"internal error","data":null}"#.to_string(),
            )
        }
    }
}

pub fn success_response(data: Value) -> Response<Full<Bytes>> {
    envelope_response(StatusCode::OK, &Envelope::success(data))
}

pub fn error_response(err: &AppError) -> Response<Full<Bytes>> {
    envelope_response(err.status(), &Envelope::from_error(err))
}
