//! Datasync CLI
//!
//! Command-line tools for running and inspecting Datasync tables.
//!
//! # Commands
//!
//! - `serve` - Serve tables over HTTP
//! - `dump` - Print the entities of a stored table
//! - `compact` - Rewrite a file-backed table's journal
//! - `token` - Issue a bearer token

mod commands;

use clap::{Parser, Subcommand};
use commands::Backend;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Datasync table server and tools.
#[derive(Parser)]
#[command(name = "datasync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve tables over HTTP
    Serve {
        /// Storage backend
        #[arg(short, long, value_enum, default_value_t = Backend::Memory)]
        backend: Backend,

        /// Data location: a database file for sqlite, a directory for file
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Table to serve (repeatable)
        #[arg(short, long = "table", default_value = "movies")]
        tables: Vec<String>,

        /// Mark entities deleted instead of removing them
        #[arg(long)]
        soft_delete: bool,

        /// Items per page of query results
        #[arg(long, default_value_t = datasync_core::TableOptions::default().page_size)]
        page_size: usize,

        /// Largest accepted $top
        #[arg(long, default_value_t = datasync_core::TableOptions::default().max_top)]
        max_top: usize,

        /// Secret for bearer tokens
        #[arg(long)]
        auth_secret: Option<String>,

        /// Reject anonymous requests
        #[arg(long, requires = "auth_secret")]
        require_auth: bool,

        /// Allow cross-origin requests
        #[arg(long)]
        cors: bool,

        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },

    /// Print the entities of a stored table
    Dump {
        /// Storage backend
        #[arg(short, long, value_enum)]
        backend: Backend,

        /// Data location
        #[arg(short, long)]
        data: PathBuf,

        /// Table to dump
        #[arg(short, long)]
        table: String,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,

        /// Include soft-deleted entities
        #[arg(long)]
        include_deleted: bool,
    },

    /// Rewrite a file-backed table's journal, dropping superseded records
    Compact {
        /// Data directory
        #[arg(short, long)]
        data: PathBuf,

        /// Table to compact
        #[arg(short, long)]
        table: String,
    },

    /// Issue a bearer token
    Token {
        /// Secret shared with the server
        #[arg(long)]
        secret: String,

        /// User id to embed
        #[arg(short, long)]
        user: String,

        /// Token lifetime in seconds
        #[arg(long, default_value = "86400")]
        ttl_secs: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            backend,
            data,
            tables,
            soft_delete,
            page_size,
            max_top,
            auth_secret,
            require_auth,
            cors,
            bind,
        } => {
            let options = datasync_core::TableOptions::default()
                .with_soft_delete(soft_delete)
                .with_page_size(page_size)
                .with_max_top(max_top);
            let auth = commands::serve::Auth {
                secret: auth_secret,
                required: require_auth,
            };
            commands::serve::run(backend, data.as_deref(), &tables, options, auth, cors, bind)?;
        }
        Commands::Dump {
            backend,
            data,
            table,
            json,
            include_deleted,
        } => {
            commands::dump::run(backend, &data, &table, json, include_deleted)?;
        }
        Commands::Compact { data, table } => {
            commands::compact::run(&data, &table)?;
        }
        Commands::Token {
            secret,
            user,
            ttl_secs,
        } => {
            commands::token::run(&secret, &user, ttl_secs)?;
        }
        Commands::Version => {
            println!("Datasync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Datasync Core v{}", datasync_core::VERSION);
        }
    }

    Ok(())
}
