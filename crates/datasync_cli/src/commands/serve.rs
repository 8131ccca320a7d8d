//! Serve command implementation.

use super::{open_repository, Backend};
use datasync_core::TableOptions;
use datasync_server::{DatasyncServer, ServerConfig, TableController};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

/// Authentication settings for `serve`.
#[derive(Debug, Default)]
pub struct Auth {
    /// Token secret.
    pub secret: Option<String>,
    /// Whether anonymous requests are rejected.
    pub required: bool,
}

/// Runs the serve command until Ctrl-C.
pub fn run(
    backend: Backend,
    data: Option<&Path>,
    tables: &[String],
    options: TableOptions,
    auth: Auth,
    cors: bool,
    bind: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = build(backend, data, tables, options, auth, cors, bind)?;
    info!(?backend, %bind, "starting");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

/// Assembles the server without starting it.
pub fn build(
    backend: Backend,
    data: Option<&Path>,
    tables: &[String],
    options: TableOptions,
    auth: Auth,
    cors: bool,
    bind: SocketAddr,
) -> Result<DatasyncServer, Box<dyn std::error::Error>> {
    options.validate()?;
    if tables.is_empty() {
        return Err("at least one --table is required".into());
    }

    let mut config = ServerConfig::new(bind).with_cors(cors);
    if let Some(secret) = auth.secret {
        config = if auth.required {
            config.with_auth(secret.into_bytes())
        } else {
            config.with_optional_auth(secret.into_bytes())
        };
    }
    config.validate()?;

    let mut server = DatasyncServer::new(config);
    for table in tables {
        let repository = open_repository(backend, data, table)?;
        info!(table = %table, entities = repository.count()?, "table opened");
        server.register(
            TableController::new(table.as_str(), repository).with_options(options.clone()),
        );
    }
    Ok(server)
}
