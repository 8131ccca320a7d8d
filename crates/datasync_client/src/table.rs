//! Remote tables.

use crate::config::ClientConfig;
use crate::conflict::{ConflictPolicy, Resolution};
use crate::error::{ClientError, ClientResult};
use crate::query::Query;
use crate::transport::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestClient};
use chrono::{DateTime, Utc};
use datasync_core::{PagedResult, TableData};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

const JSON: &str = "application/json";
const MERGE_PATCH: &str = "application/merge-patch+json";

/// A client for one Datasync server.
///
/// # Example
///
/// ```no_run
/// use datasync_client::{ClientConfig, DatasyncClient, Query};
///
/// let client = DatasyncClient::new(ClientConfig::new("http://localhost:8080"))?;
/// let movies = client.table("movies");
/// let recent = movies.query_all(&Query::new().filter("year ge 2000"))?;
/// println!("{} recent movies", recent.len());
/// # Ok::<(), datasync_client::ClientError>(())
/// ```
pub struct DatasyncClient<C: HttpClient = ReqwestClient> {
    config: ClientConfig,
    http: C,
}

impl DatasyncClient<ReqwestClient> {
    /// Creates a client using `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = ReqwestClient::new(config.timeout)?;
        Self::with_http_client(config, http)
    }
}

impl<C: HttpClient> DatasyncClient<C> {
    /// Creates a client over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_http_client(config: ClientConfig, http: C) -> ClientResult<Self> {
        config.validate()?;
        Ok(Self { config, http })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn http_client(&self) -> &C {
        &self.http
    }

    /// Returns a handle to the table `name`, using the default conflict
    /// policy.
    pub fn table(&self, name: &str) -> RemoteTable<'_, C> {
        RemoteTable {
            client: self,
            name: name.to_string(),
            policy: self.config.conflict_policy,
        }
    }

    /// Sends a request with the common headers, retrying transport
    /// failures and retryable statuses.
    fn execute(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        if !self.http.is_healthy() {
            return Err(ClientError::NotConnected);
        }
        let mut request = request.with_header("ZUMO-API-VERSION", self.config.api_version.as_str());
        if let Some(token) = &self.config.auth_token {
            request = request.with_header("Authorization", format!("Bearer {token}"));
        }

        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let outcome = match self.http.send(request.clone()) {
                Ok(response) if response.is_success() || response.status == 304 => {
                    return Ok(response)
                }
                Ok(response) => error_from_response(&response),
                Err(message) => ClientError::transport_retryable(message),
            };

            attempt += 1;
            if !outcome.is_retryable() || attempt >= retry.max_attempts {
                debug!(method = %request.method, url = %request.url, error = %outcome, "request failed");
                return Err(outcome);
            }
            let delay = retry.delay_for_attempt(attempt);
            warn!(
                method = %request.method,
                url = %request.url,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %outcome,
                "retrying request"
            );
            std::thread::sleep(delay);
        }
    }

    /// Resolves a server-relative link against the base URL.
    fn absolute(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{link}", self.config.base_url)
        }
    }
}

impl<C: HttpClient> std::fmt::Debug for DatasyncClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasyncClient")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.config.auth_token.is_some())
            .finish()
    }
}

/// A handle to one remote table.
pub struct RemoteTable<'a, C: HttpClient> {
    client: &'a DatasyncClient<C>,
    name: String,
    policy: ConflictPolicy,
}

impl<'a, C: HttpClient> RemoteTable<'a, C> {
    /// Overrides the conflict policy for this handle.
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the conflict policy.
    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Reads an entity.
    ///
    /// # Errors
    ///
    /// `Status` with `404` if missing or `410` if soft-deleted.
    pub fn get(&self, id: &str) -> ClientResult<TableData> {
        let response = self
            .client
            .execute(HttpRequest::new(HttpMethod::Get, self.entity_url(id)?))?;
        decode(&response)
    }

    /// Creates an entity.
    ///
    /// If the id already exists the conflict policy decides between the
    /// stored entity and replacing it.
    ///
    /// # Errors
    ///
    /// `Conflict` when the policy leaves the conflict unresolved.
    pub fn insert(&self, entity: &TableData) -> ClientResult<TableData> {
        let request = HttpRequest::new(HttpMethod::Post, self.table_url())
            .with_body(JSON, encode(entity)?);
        match self.client.execute(request) {
            Ok(response) => decode(&response),
            Err(ClientError::Conflict { status, server }) => self.settle(entity, status, *server),
            Err(e) => Err(e),
        }
    }

    /// Replaces an entity, guarded by its version.
    ///
    /// # Errors
    ///
    /// `Conflict` when the policy leaves a conflict unresolved.
    pub fn replace(&self, entity: &TableData) -> ClientResult<TableData> {
        match self.try_replace(entity) {
            Err(ClientError::Conflict { status, server }) => self.settle(entity, status, *server),
            other => other,
        }
    }

    /// Applies a JSON merge patch, guarded by `version` when given.
    ///
    /// Conflicts are returned to the caller since a patch is not a complete
    /// entity.
    ///
    /// # Errors
    ///
    /// `Conflict` if the version is stale.
    pub fn patch(
        &self,
        id: &str,
        patch: &Value,
        version: Option<&datasync_core::Version>,
    ) -> ClientResult<TableData> {
        let mut request = HttpRequest::new(HttpMethod::Patch, self.entity_url(id)?)
            .with_body(MERGE_PATCH, patch.to_string().into_bytes());
        if let Some(etag) = version.and_then(datasync_core::Version::to_etag) {
            request = request.with_header("If-Match", etag);
        }
        decode(&self.client.execute(request)?)
    }

    /// Deletes an entity, guarded by its version.
    ///
    /// Under [`ConflictPolicy::ServerWins`] a lost check leaves the server
    /// entity in place and returns it; a winning client deletes again with
    /// the server version.
    ///
    /// # Errors
    ///
    /// `Conflict` when the policy leaves a conflict unresolved.
    pub fn delete(&self, entity: &TableData) -> ClientResult<Option<TableData>> {
        match self.try_delete(entity) {
            Ok(()) => Ok(None),
            Err(ClientError::Conflict { status, server }) => {
                match self.policy.resolve(entity, &server) {
                    Resolution::UseServer(server) => Ok(Some(server)),
                    Resolution::Retry(retry) => self.try_delete(&retry).map(|()| None),
                    Resolution::Unresolved => Err(ClientError::Conflict { status, server }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches one page of results.
    ///
    /// # Errors
    ///
    /// `Status` with `400` for an invalid query.
    pub fn query(&self, query: &Query) -> ClientResult<PagedResult> {
        let mut url = self.table_url();
        let rendered = query.to_query_string();
        if !rendered.is_empty() {
            url.push('?');
            url.push_str(&rendered);
        }
        self.page(&url)
    }

    /// Fetches every page of results by following `nextLink`.
    ///
    /// # Errors
    ///
    /// As [`Self::query`].
    pub fn query_all(&self, query: &Query) -> ClientResult<Vec<Value>> {
        let mut page = self.query(query)?;
        let mut items = std::mem::take(&mut page.items);
        while let Some(link) = page.next_link.take() {
            page = self.page(&self.client.absolute(&link))?;
            items.append(&mut page.items);
        }
        debug!(table = %self.name, count = items.len(), "query complete");
        Ok(items)
    }

    /// Fetches every entity changed after `since`, oldest first, including
    /// soft-deleted ones.
    ///
    /// Feed the `updated_at` of the last returned entity back in as `since`
    /// for the next pull.
    ///
    /// # Errors
    ///
    /// As [`Self::query`], or `Protocol` if an item is not an entity.
    pub fn pull(&self, since: Option<DateTime<Utc>>) -> ClientResult<Vec<TableData>> {
        self.query_all(&Query::changed_since(since))?
            .into_iter()
            .map(|item| {
                TableData::from_value(item).map_err(|e| ClientError::Protocol(e.to_string()))
            })
            .collect()
    }

    fn try_replace(&self, entity: &TableData) -> ClientResult<TableData> {
        let request = self
            .guarded(HttpRequest::new(HttpMethod::Put, self.entity_url(&entity.id)?), entity)
            .with_body(JSON, encode(entity)?);
        decode(&self.client.execute(request)?)
    }

    fn try_delete(&self, entity: &TableData) -> ClientResult<()> {
        let request = self.guarded(
            HttpRequest::new(HttpMethod::Delete, self.entity_url(&entity.id)?),
            entity,
        );
        self.client.execute(request).map(|_| ())
    }

    /// Applies the conflict policy after a lost write.
    fn settle(&self, local: &TableData, status: u16, server: TableData) -> ClientResult<TableData> {
        match self.policy.resolve(local, &server) {
            Resolution::UseServer(server) => Ok(server),
            Resolution::Retry(retry) => self.try_replace(&retry),
            Resolution::Unresolved => Err(ClientError::conflict(status, server)),
        }
    }

    fn guarded(&self, request: HttpRequest, entity: &TableData) -> HttpRequest {
        match entity.etag() {
            Some(etag) => request.with_header("If-Match", etag),
            None => request,
        }
    }

    fn page(&self, url: &str) -> ClientResult<PagedResult> {
        let response = self
            .client
            .execute(HttpRequest::new(HttpMethod::Get, url))?;
        decode(&response)
    }

    fn table_url(&self) -> String {
        format!("{}/tables/{}", self.client.config.base_url, self.name)
    }

    fn entity_url(&self, id: &str) -> ClientResult<String> {
        let base = self.table_url();
        let mut url = url::Url::parse(&base).map_err(|e| ClientError::Config(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::Config(format!("'{base}' cannot take a path")))?
            .push(id);
        Ok(url.into())
    }
}

fn encode(entity: &TableData) -> ClientResult<Vec<u8>> {
    serde_json::to_vec(entity).map_err(|e| ClientError::Protocol(e.to_string()))
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> ClientResult<T> {
    serde_json::from_slice(&response.body)
        .map_err(|e| ClientError::Protocol(format!("invalid response body: {e}")))
}

/// Turns a non-success response into an error.
fn error_from_response(response: &HttpResponse) -> ClientError {
    if matches!(response.status, 409 | 412) {
        if let Ok(server) = serde_json::from_slice::<TableData>(&response.body) {
            return ClientError::conflict(response.status, server);
        }
    }
    let message = serde_json::from_slice::<Value>(&response.body)
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned());
    ClientError::Status {
        status: response.status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::transport::MockHttpClient;
    use datasync_core::Version;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn client(policy: ConflictPolicy) -> (DatasyncClient<Arc<MockHttpClient>>, Arc<MockHttpClient>) {
        let mock = Arc::new(MockHttpClient::new());
        let config = ClientConfig::new("http://localhost:8080")
            .with_auth_token("tok")
            .with_conflict_policy(policy)
            .with_retry(
                RetryConfig::new(3)
                    .with_initial_delay(Duration::from_millis(1))
                    .with_jitter(false),
            );
        let client = DatasyncClient::with_http_client(config, Arc::clone(&mock)).unwrap();
        (client, mock)
    }

    fn entity(id: &str, title: &str, version: u8) -> TableData {
        let mut entity = TableData::new(id).with_property("title", title);
        entity.version = Version::new(vec![version]);
        entity
    }

    fn entity_response(status: u16, entity: &TableData) -> HttpResponse {
        HttpResponse::json(status, &entity.to_value().unwrap())
    }

    #[test]
    fn get_sends_common_headers() {
        let (client, mock) = client(ConflictPolicy::Manual);
        mock.push_response(entity_response(200, &entity("m 1", "Heat", 1)));

        let fetched = client.table("movies").get("m 1").unwrap();
        assert_eq!(fetched.id, "m 1");

        let request = &mock.requests()[0];
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "http://localhost:8080/tables/movies/m%201");
        assert_eq!(request.header("zumo-api-version"), Some("3.0.0"));
        assert_eq!(request.header("authorization"), Some("Bearer tok"));
    }

    #[test]
    fn replace_sends_if_match() {
        let (client, mock) = client(ConflictPolicy::Manual);
        let local = entity("m1", "Heat", 1);
        mock.push_response(entity_response(200, &entity("m1", "Heat", 2)));

        let stored = client.table("movies").replace(&local).unwrap();
        assert_eq!(stored.version, Version::new(vec![2]));
        let request = &mock.requests()[0];
        assert_eq!(request.header("if-match"), local.etag().as_deref());
        assert_eq!(request.header("content-type"), Some(JSON));
    }

    #[test]
    fn replace_conflict_manual() {
        let (client, mock) = client(ConflictPolicy::Manual);
        let server = entity("m1", "Server", 5);
        mock.push_response(entity_response(412, &server));

        let err = client.table("movies").replace(&entity("m1", "Local", 1)).unwrap_err();
        assert_eq!(err.status(), Some(412));
        assert_eq!(err.server_entity(), Some(&server));
    }

    #[test]
    fn replace_conflict_server_wins() {
        let (client, mock) = client(ConflictPolicy::ServerWins);
        let server = entity("m1", "Server", 5);
        mock.push_response(entity_response(412, &server));

        let kept = client.table("movies").replace(&entity("m1", "Local", 1)).unwrap();
        assert_eq!(kept, server);
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn replace_conflict_client_wins_retries_with_server_version() {
        let (client, mock) = client(ConflictPolicy::ClientWins);
        let server = entity("m1", "Server", 5);
        mock.push_response(entity_response(412, &server));
        mock.push_response(entity_response(200, &entity("m1", "Local", 6)));

        let stored = client.table("movies").replace(&entity("m1", "Local", 1)).unwrap();
        assert_eq!(stored.property("title"), Some(&json!("Local")));

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].header("if-match"), server.etag().as_deref());
    }

    #[test]
    fn insert_conflict_uses_policy() {
        let (client, mock) = client(ConflictPolicy::ClientWins);
        let server = entity("m1", "Server", 5);
        mock.push_response(entity_response(409, &server));
        mock.push_response(entity_response(200, &entity("m1", "Local", 6)));

        let stored = client
            .table("movies")
            .insert(&TableData::new("m1").with_property("title", "Local"))
            .unwrap();
        assert_eq!(stored.property("title"), Some(&json!("Local")));
        assert_eq!(mock.requests()[1].method, HttpMethod::Put);
    }

    #[test]
    fn delete_conflict_server_wins_returns_server() {
        let (client, mock) = client(ConflictPolicy::ServerWins);
        let server = entity("m1", "Server", 5);
        mock.push_response(entity_response(412, &server));

        let kept = client.table("movies").delete(&entity("m1", "Local", 1)).unwrap();
        assert_eq!(kept, Some(server));

        mock.push_response(HttpResponse::new(204));
        assert_eq!(client.table("movies").delete(&entity("m1", "x", 5)).unwrap(), None);
    }

    #[test]
    fn patch_uses_merge_patch() {
        let (client, mock) = client(ConflictPolicy::Manual);
        mock.push_response(entity_response(200, &entity("m1", "Heat", 2)));

        client
            .table("movies")
            .patch("m1", &json!({"title": "Heat"}), Some(&Version::new(vec![1])))
            .unwrap();
        let request = &mock.requests()[0];
        assert_eq!(request.method, HttpMethod::Patch);
        assert_eq!(request.header("content-type"), Some(MERGE_PATCH));
        assert_eq!(request.header("if-match"), Some("\"AQ==\""));
    }

    #[test]
    fn query_all_follows_next_link() {
        let (client, mock) = client(ConflictPolicy::Manual);
        mock.push_response(HttpResponse::json(
            200,
            &json!({"items": [{"id": "a"}, {"id": "b"}], "nextLink": "/tables/movies?$skip=2"}),
        ));
        mock.push_response(HttpResponse::json(200, &json!({"items": [{"id": "c"}]})));

        let items = client.table("movies").query_all(&Query::new()).unwrap();
        assert_eq!(items.len(), 3);
        let requests = mock.requests();
        assert_eq!(requests[0].url, "http://localhost:8080/tables/movies");
        assert_eq!(requests[1].url, "http://localhost:8080/tables/movies?$skip=2");
    }

    #[test]
    fn retries_transport_failures_and_server_errors() {
        let (client, mock) = client(ConflictPolicy::Manual);
        mock.push_failure("connection reset");
        mock.push_response(HttpResponse::json(503, &json!({"error": "busy"})));
        mock.push_response(entity_response(200, &entity("m1", "Heat", 1)));

        assert!(client.table("movies").get("m1").is_ok());
        assert_eq!(mock.requests().len(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let (client, mock) = client(ConflictPolicy::Manual);
        for _ in 0..3 {
            mock.push_response(HttpResponse::json(500, &json!({"error": "boom"})));
        }
        let err = client.table("movies").get("m1").unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "server returned 500: boom");
        assert_eq!(mock.pending(), 0);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let (client, mock) = client(ConflictPolicy::Manual);
        mock.push_response(HttpResponse::json(404, &json!({"error": "not found"})));
        mock.push_response(HttpResponse::new(200));

        let err = client.table("movies").get("m1").unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(mock.pending(), 1);
    }

    #[test]
    fn unhealthy_transport_is_not_connected() {
        let (client, mock) = client(ConflictPolicy::Manual);
        mock.set_healthy(false);
        assert!(matches!(
            client.table("movies").get("m1"),
            Err(ClientError::NotConnected)
        ));
        assert!(mock.requests().is_empty());
    }
}
