//! HTTP test harness.
//!
//! [`TestServer`] drives a router in-process with `tower::ServiceExt::oneshot`;
//! [`LiveServer`] binds a real socket for clients that need one.

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use datasync_core::{PagedResult, TableData};
use datasync_server::{DatasyncServer, TokenValidator};
use serde_json::Value;
use std::net::SocketAddr;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tower::ServiceExt;

/// An in-process server.
pub struct TestServer {
    router: Router,
    validator: Option<TokenValidator>,
}

impl TestServer {
    /// Builds the router of `server`.
    pub fn new(server: &DatasyncServer) -> Self {
        Self {
            router: server.router().expect("Failed to build router"),
            validator: server.token_validator(),
        }
    }

    /// Issues a token for `user` with the server's secret.
    pub fn token(&self, user: &str) -> String {
        self.validator
            .as_ref()
            .expect("Server has no auth secret")
            .create_token(user)
            .expect("Failed to create token")
    }

    /// Sends a request and buffers the response.
    pub async fn send(&self, request: TestRequest) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request.build())
            .await
            .expect("Router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// A request under construction.
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TestRequest {
    /// Creates a request with no headers or body.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// `GET uri`
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// `POST uri`
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// `PUT uri`
    pub fn put(uri: impl Into<String>) -> Self {
        Self::new(Method::PUT, uri)
    }

    /// `PATCH uri`
    pub fn patch(uri: impl Into<String>) -> Self {
        Self::new(Method::PATCH, uri)
    }

    /// `DELETE uri`
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(self, body: &Value) -> Self {
        self.body("application/json", body.to_string())
    }

    /// Sets a raw body with its content type.
    #[must_use]
    pub fn body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.header("content-type", content_type)
    }

    /// Adds `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    /// Adds `If-Match`.
    #[must_use]
    pub fn if_match(self, etag: &str) -> Self {
        self.header("if-match", etag)
    }

    /// Adds `If-None-Match`.
    #[must_use]
    pub fn if_none_match(self, etag: &str) -> Self {
        self.header("if-none-match", etag)
    }

    fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        builder
            .body(Body::from(self.body))
            .expect("Failed to build request")
    }
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl TestResponse {
    /// Returns a header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `ETag` header.
    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Body is not JSON")
    }

    /// Parses the body as an entity.
    pub fn entity(&self) -> TableData {
        serde_json::from_slice(&self.body).expect("Body is not an entity")
    }

    /// Parses the body as a query page.
    pub fn page(&self) -> PagedResult {
        serde_json::from_slice(&self.body).expect("Body is not a page")
    }
}

/// A server listening on an ephemeral localhost port in a background
/// thread. Stops when dropped.
pub struct LiveServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl LiveServer {
    /// Starts serving `server`.
    pub fn start(server: DatasyncServer) -> Self {
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("Failed to build runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("Failed to bind");
                addr_tx
                    .send(listener.local_addr().expect("Listener has no address"))
                    .expect("Test dropped before startup");
                server
                    .serve_with_shutdown(listener, async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("Server failed");
            });
        });

        let addr = addr_rx.recv().expect("Server failed to start");
        Self {
            addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    /// Returns the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the base URL, e.g. `http://127.0.0.1:49152`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for LiveServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
