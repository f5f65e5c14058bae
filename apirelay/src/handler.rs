//! HTTP request handling logic

use super::app_state::AppState;
use super::error::AppError;
use super::extract::ResponseExtractor;
use super::hyper::body::{Body, Bytes};
use super::hyper::{Method, Request, Response, StatusCode, header};
use super::model::{ConfigPatch, DeleteRequest, NewConfig};
use super::observability::metrics::{RequestMetrics, export_metrics};
use super::observability::tracing::http_span;
use super::query::{ListParams, QueryBuilder};
use super::response::{create_json_response, error_response, success_response};
use super::upload::{TempUpload, UploadForm};
use super::{Arc, http_body_util::Full};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    List,
    Get,
    Add,
    Edit,
    Delete,
    Upload,
}

impl Route {
    fn resolve(path: &str) -> Option<Self> {
        match path {
            "/api/list" => Some(Route::List),
            "/api/get" => Some(Route::Get),
            "/api/add" => Some(Route::Add),
            "/api/edit" => Some(Route::Edit),
            "/api/delete" => Some(Route::Delete),
            "/api/upload" => Some(Route::Upload),
            _ => None,
        }
    }

    fn method(self) -> Method {
        match self {
            Route::List | Route::Get => Method::GET,
            _ => Method::POST,
        }
    }
}

/// Handle HTTP request and generate response. Failures never escape as
/// `Err`; they are rendered into the envelope here.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // Health endpoint shortcut
    if method == Method::GET && path == "/healthz" {
        return Ok(create_json_response(
            StatusCode::OK,
            json!({"status":"ok"}).to_string(),
        ));
    }

    if method == Method::GET && path == "/metrics" && state.metrics_enabled {
        return Ok(metrics_response());
    }

    let route = Route::resolve(&path);
    let metrics = RequestMetrics::new(
        method.as_str(),
        if route.is_some() { path.as_str() } else { "unmatched" },
    );
    let span = http_span(method.as_str(), &path);

    let result = async {
        let route = route.ok_or(AppError::NotFound("not found"))?;
        if method != route.method() {
            return Err(AppError::MethodNotAllowed);
        }
        dispatch(route, req, &state).await
    }
    .instrument(span.clone())
    .await;

    let response = match result {
        Ok(data) => success_response(data),
        Err(err) => {
            span.in_scope(|| {
                if err.status().is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                } else {
                    tracing::warn!(error = %err, "Request rejected");
                }
            });
            error_response(&err)
        }
    };

    span.record("http.status_code", response.status().as_u16());
    metrics.record(response.status().as_u16());
    Ok(response)
}

async fn dispatch<B>(route: Route, req: Request<B>, state: &AppState) -> Result<Value, AppError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    match route {
        Route::List => list_configs(&extract_query_params(parts.uri.query()), state).await,
        Route::Get => get_config(&extract_query_params(parts.uri.query()), state).await,
        Route::Add => {
            let input: NewConfig = read_json(body, state.max_body_size).await?;
            add_config(input, state).await
        }
        Route::Edit => {
            let input: ConfigPatch = read_json(body, state.max_body_size).await?;
            edit_config(input, state).await
        }
        Route::Delete => {
            let input: DeleteRequest = read_json(body, state.max_body_size).await?;
            delete_config(input, state).await
        }
        Route::Upload => {
            let content_type = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let bytes = read_body(body, state.max_body_size, "file upload failed").await?;
            let form = UploadForm::parse(content_type, bytes).await.map_err(|e| {
                tracing::warn!(error = %e, "Unreadable upload form");
                AppError::BadRequest("file upload failed")
            })?;
            upload_file(form, state).await
        }
    }
}

async fn list_configs(query: &HashMap<String, String>, state: &AppState) -> Result<Value, AppError> {
    let plan = QueryBuilder::build(&ListParams::from_query(query))?;
    let page = state
        .store
        .list(&plan)
        .await
        .map_err(|e| AppError::storage("query failed", e))?;

    Ok(json!({
        "total": page.total,
        "totalPages": plan.total_pages(page.total),
        "currentPage": plan.page,
        "pageSize": plan.page_size,
        "data": page.items,
    }))
}

async fn get_config(query: &HashMap<String, String>, state: &AppState) -> Result<Value, AppError> {
    let id = query
        .get("id")
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(AppError::BadRequest("invalid id"))?;
    let record = state
        .store
        .get_by_id(id)
        .await
        .map_err(|e| AppError::storage("query failed", e))?;
    to_value(&record)
}

async fn add_config(input: NewConfig, state: &AppState) -> Result<Value, AppError> {
    if let Err(reason) = input.validate() {
        tracing::debug!(reason, "Rejected new config");
        return Err(AppError::BadRequest("invalid parameters"));
    }
    let record = state
        .store
        .create(&input)
        .await
        .map_err(|e| AppError::storage("create failed", e))?;
    tracing::info!(id = record.id, name = %record.name, "Config created");
    to_value(&record)
}

async fn edit_config(input: ConfigPatch, state: &AppState) -> Result<Value, AppError> {
    if input.id <= 0 {
        return Err(AppError::BadRequest("invalid parameters"));
    }
    let record = state
        .store
        .update_partial(&input)
        .await
        .map_err(|e| AppError::storage("update failed", e))?;
    tracing::info!(id = record.id, "Config updated");
    to_value(&record)
}

async fn delete_config(input: DeleteRequest, state: &AppState) -> Result<Value, AppError> {
    if input.id <= 0 {
        return Err(AppError::BadRequest("invalid parameters"));
    }
    state
        .store
        .delete_by_id(input.id)
        .await
        .map_err(|e| AppError::storage("delete failed", e))?;
    tracing::info!(id = input.id, "Config deleted");
    Ok(Value::Null)
}

/// configId is checked and the config resolved before anything touches disk
/// or the network.
async fn upload_file(form: UploadForm, state: &AppState) -> Result<Value, AppError> {
    let config_id = form
        .config_id
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(AppError::BadRequest("invalid configId"))?;

    let config = state
        .store
        .get_by_id(config_id)
        .await
        .map_err(|e| AppError::storage("query failed", e))?;

    let file = form.file.ok_or(AppError::BadRequest("file upload failed"))?;
    let staged = TempUpload::stage(file)
        .await
        .map_err(|e| AppError::internal("file save failed", e))?;

    let raw = state
        .relay
        .relay(&config, staged.path(), staged.file_name())
        .await?;
    drop(staged);

    let url = ResponseExtractor::extract(&config.response_rule, &raw)?;
    Ok(json!({ "url": url }))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::internal("internal error", e))
}

/// Collect the body, refusing anything over `limit` bytes
async fn read_body<B>(body: B, limit: usize, message: &'static str) -> Result<Bytes, AppError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(AppError::PayloadTooLarge),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            Err(AppError::BadRequest(message))
        }
    }
}

async fn read_json<B, T>(body: B, limit: usize) -> Result<T, AppError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T: DeserializeOwned,
{
    let bytes = read_body(body, limit, "invalid parameters").await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(error = %e, "Invalid JSON body");
        AppError::BadRequest("invalid parameters")
    })
}

/// Extract query parameters from URI query string. Values are
/// percent-decoded and the first occurrence of a key wins.
fn extract_query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query_str) = query {
        for (key, value) in url::form_urlencoded::parse(query_str.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
    }
    params
}

fn metrics_response() -> Response<Full<Bytes>> {
    match export_metrics() {
        Ok(text) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(text)))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))),
        Err(e) => {
            tracing::error!(error = %e, "Failed to export metrics");
            error_response(&AppError::internal("internal error", e))
        }
    }
}
