//! The HTTP server hosting a set of tables.

use crate::auth::TokenValidator;
use crate::config::ServerConfig;
use crate::controller::TableController;
use crate::error::{ServerError, ServerResult};
use crate::handler::{self, AppState};
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Datasync server.
///
/// Each registered [`TableController`] is exposed under
/// `/tables/{name}`:
///
/// | Method | Path | Operation |
/// |--------|------|-----------|
/// | `GET` | `/tables/{name}` | query |
/// | `POST` | `/tables/{name}` | create |
/// | `GET` | `/tables/{name}/{id}` | read |
/// | `PUT` | `/tables/{name}/{id}` | replace |
/// | `PATCH` | `/tables/{name}/{id}` | patch |
/// | `DELETE` | `/tables/{name}/{id}` | delete |
///
/// # Example
///
/// ```
/// use datasync_server::{DatasyncServer, ServerConfig, TableController};
/// use datasync_storage::InMemoryRepository;
/// use std::sync::Arc;
///
/// let server = DatasyncServer::new(ServerConfig::default())
///     .with_table(TableController::new("movies", Arc::new(InMemoryRepository::new())));
/// assert_eq!(server.table_names(), vec!["movies"]);
/// let _router = server.router().unwrap();
/// ```
pub struct DatasyncServer {
    config: ServerConfig,
    tables: HashMap<String, Arc<TableController>>,
}

impl DatasyncServer {
    /// Creates a server with no tables.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            tables: HashMap::new(),
        }
    }

    /// Registers a table, replacing any table of the same name.
    #[must_use]
    pub fn with_table(mut self, controller: TableController) -> Self {
        self.register(controller);
        self
    }

    /// Registers a table, replacing any table of the same name.
    pub fn register(&mut self, controller: TableController) {
        info!(table = controller.name(), "table registered");
        self.tables
            .insert(controller.name().to_string(), Arc::new(controller));
    }

    /// Returns a registered table.
    pub fn table(&self, name: &str) -> Option<&Arc<TableController>> {
        self.tables.get(name)
    }

    /// Returns the registered table names, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns a validator for the configured secret, if any.
    pub fn token_validator(&self) -> Option<TokenValidator> {
        self.config.auth_config().map(TokenValidator::new)
    }

    /// Builds the axum router for the registered tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn router(&self) -> ServerResult<Router> {
        self.config.validate()?;
        let state = AppState {
            tables: Arc::new(self.tables.clone()),
            validator: self.token_validator(),
            require_auth: self.config.require_auth,
        };

        let router = Router::new()
            .route("/health", get(handler::health))
            .route(
                "/tables/:table",
                get(handler::query_table).post(handler::create_entity),
            )
            .route(
                "/tables/:table/:id",
                get(handler::read_entity)
                    .put(handler::replace_entity)
                    .patch(handler::patch_entity)
                    .delete(handler::delete_entity),
            )
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .layer(TraceLayer::new_for_http());

        Ok(if self.config.enable_cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        })
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the socket fails.
    pub async fn serve(&self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the socket fails.
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router()?;
        let addr = listener.local_addr()?;
        info!(%addr, tables = ?self.table_names(), "datasync server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::from)?;
        info!("datasync server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for DatasyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasyncServer")
            .field("bind_addr", &self.config.bind_addr)
            .field("tables", &self.table_names())
            .finish()
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasync_storage::InMemoryRepository;

    fn table(name: &str) -> TableController {
        TableController::new(name, Arc::new(InMemoryRepository::new()))
    }

    #[test]
    fn registers_tables() {
        let mut server = DatasyncServer::new(ServerConfig::default())
            .with_table(table("movies"))
            .with_table(table("books"));
        server.register(table("movies"));

        assert_eq!(server.table_names(), vec!["books", "movies"]);
        assert!(server.table("movies").is_some());
        assert!(server.table("albums").is_none());
        assert!(server.token_validator().is_none());
    }

    #[test]
    fn invalid_config_has_no_router() {
        let mut config = ServerConfig::default();
        config.require_auth = true;
        let server = DatasyncServer::new(config);
        assert!(matches!(server.router(), Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let server = DatasyncServer::new(ServerConfig::default()).with_table(table("movies"));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        server
            .serve_with_shutdown(listener, async {})
            .await
            .unwrap();
    }
}
