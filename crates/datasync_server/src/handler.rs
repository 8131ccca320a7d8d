//! axum handlers mapping HTTP requests onto table controllers.

use crate::auth::{bearer_token, TokenValidator};
use crate::controller::{parse_body, RequestContext, TableController};
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::{self, AsHeaderName};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use datasync_core::{Identity, Preconditions, TableData, TableError, TableResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Header carrying the client protocol version.
pub const API_VERSION_HEADER: &str = "zumo-api-version";
/// Alternative header carrying the bearer token.
pub const ZUMO_AUTH_HEADER: &str = "x-zumo-auth";

/// Shared state of the HTTP surface.
#[derive(Clone)]
pub(crate) struct AppState {
    pub tables: Arc<HashMap<String, Arc<TableController>>>,
    pub validator: Option<TokenValidator>,
    pub require_auth: bool,
}

impl AppState {
    /// Resolves the caller from the request headers.
    fn authenticate(&self, headers: &HeaderMap) -> TableResult<Identity> {
        let token = bearer_token(
            header_str(headers, header::AUTHORIZATION),
            header_str(headers, ZUMO_AUTH_HEADER),
        );
        let unauthorized = TableError::Unauthorized { status: 401 };

        match (&self.validator, token) {
            (Some(validator), Some(token)) => validator.validate(token).map_err(|e| {
                warn!(error = %e, "rejected token");
                unauthorized
            }),
            _ if self.require_auth => {
                debug!("anonymous request rejected");
                Err(unauthorized)
            }
            _ => Ok(Identity::anonymous()),
        }
    }

    /// Common request preamble: version check, table lookup, caller and
    /// preconditions.
    fn prepare(
        &self,
        table: &str,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> TableResult<(Arc<TableController>, RequestContext)> {
        check_api_version(header_str(headers, API_VERSION_HEADER))?;
        let controller = self.tables.get(table).cloned().ok_or_else(|| {
            debug!(table, "unknown table");
            TableError::NotFound
        })?;
        let identity = self.authenticate(headers)?;
        let preconditions = Preconditions::from_headers(
            header_str(headers, header::IF_MATCH),
            header_str(headers, header::IF_NONE_MATCH),
            header_str(headers, header::IF_MODIFIED_SINCE),
            header_str(headers, header::IF_UNMODIFIED_SINCE),
        );
        let ctx = RequestContext {
            identity,
            preconditions,
            include_deleted: datasync_query::include_deleted(query.unwrap_or_default()),
        };
        Ok((controller, ctx))
    }
}

/// A [`TableError`] rendered as an HTTP response.
///
/// Errors carrying the current entity (`409`, `412`) send it as the body
/// together with its `ETag` and `Last-Modified`; `304` sends only the
/// headers; everything else sends `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(pub TableError);

impl From<TableError> for ApiError {
    fn from(err: TableError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if err.is_server_error() {
            error!(error = %err, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %err, "request rejected");
        }

        if let TableError::NotModified(entity) = &err {
            let mut response = status.into_response();
            set_entity_headers(response.headers_mut(), entity);
            return response;
        }
        match err.payload() {
            Some(entity) => entity_response(status, entity, None),
            None => (status, Json(json!({ "error": err.to_string() }))).into_response(),
        }
    }
}

type ApiResult = Result<Response, ApiError>;

/// `GET /tables/:table`
pub(crate) async fn query_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> ApiResult {
    let (controller, ctx) = state.prepare(&table, &headers, query.as_deref())?;
    let raw = query.unwrap_or_default();
    let page = blocking(move || controller.query(&ctx, &raw)).await?;
    Ok(Json(page).into_response())
}

/// `POST /tables/:table`
pub(crate) async fn create_entity(
    State(state): State<AppState>,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let (controller, ctx) = state.prepare(&table, &headers, query.as_deref())?;
    let value = parse_body(header_str(&headers, header::CONTENT_TYPE), &body, false)?;
    let (location, stored) = blocking(move || {
        let stored = controller.create(&ctx, value)?;
        Ok((controller.entity_route(&stored.id), stored))
    })
    .await?;
    Ok(entity_response(StatusCode::CREATED, &stored, Some(&location)))
}

/// `GET /tables/:table/:id`
pub(crate) async fn read_entity(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> ApiResult {
    let (controller, ctx) = state.prepare(&table, &headers, query.as_deref())?;
    let entity = blocking(move || controller.read(&ctx, &id)).await?;
    Ok(entity_response(StatusCode::OK, &entity, None))
}

/// `PUT /tables/:table/:id`
pub(crate) async fn replace_entity(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let (controller, ctx) = state.prepare(&table, &headers, query.as_deref())?;
    let value = parse_body(header_str(&headers, header::CONTENT_TYPE), &body, false)?;
    let entity = blocking(move || controller.replace(&ctx, &id, value)).await?;
    Ok(entity_response(StatusCode::OK, &entity, None))
}

/// `PATCH /tables/:table/:id`
pub(crate) async fn patch_entity(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let (controller, ctx) = state.prepare(&table, &headers, query.as_deref())?;
    let value = parse_body(header_str(&headers, header::CONTENT_TYPE), &body, true)?;
    let entity = blocking(move || controller.patch(&ctx, &id, value)).await?;
    Ok(entity_response(StatusCode::OK, &entity, None))
}

/// `DELETE /tables/:table/:id`
pub(crate) async fn delete_entity(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> ApiResult {
    let (controller, ctx) = state.prepare(&table, &headers, query.as_deref())?;
    blocking(move || controller.delete(&ctx, &id)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /health`
pub(crate) async fn health(State(state): State<AppState>) -> Json<Value> {
    let mut tables: Vec<&str> = state.tables.keys().map(String::as_str).collect();
    tables.sort_unstable();
    Json(json!({
        "status": "ok",
        "version": datasync_core::VERSION,
        "tables": tables,
    }))
}

/// Rejects protocol versions other than 2.x and 3.x.
pub(crate) fn check_api_version(value: Option<&str>) -> TableResult<()> {
    match value.map(str::trim) {
        None => Ok(()),
        Some(v) if v.starts_with("2.") || v.starts_with("3.") => Ok(()),
        Some(v) => Err(TableError::bad_request(format!(
            "unsupported ZUMO-API-VERSION '{v}'"
        ))),
    }
}

/// Runs repository work off the async executor.
async fn blocking<T, F>(work: F) -> TableResult<T>
where
    F: FnOnce() -> TableResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|e| Err(TableError::repository(format!("request worker failed: {e}"))))
}

fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn entity_response(status: StatusCode, entity: &TableData, location: Option<&str>) -> Response {
    let mut response = (status, Json(entity)).into_response();
    set_entity_headers(response.headers_mut(), entity);
    if let Some(location) = location.and_then(|l| HeaderValue::from_str(l).ok()) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

fn set_entity_headers(headers: &mut HeaderMap, entity: &TableData) {
    if let Some(etag) = entity.etag().and_then(|tag| HeaderValue::from_str(&tag).ok()) {
        headers.insert(header::ETAG, etag);
    }
    if let Ok(modified) = HeaderValue::from_str(&entity.last_modified()) {
        headers.insert(header::LAST_MODIFIED, modified);
    }
}
