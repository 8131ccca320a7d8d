//! Server configuration.

use crate::auth::AuthConfig;
use crate::error::{ServerError, ServerResult};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the Datasync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Whether to answer cross-origin requests permissively.
    pub enable_cors: bool,
    /// Whether anonymous requests are rejected.
    pub require_auth: bool,
    /// Secret key for token validation.
    pub auth_secret: Option<Vec<u8>>,
    /// Lifetime of issued tokens.
    pub token_expiry: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
            enable_cors: false,
            require_auth: false,
            auth_secret: None,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the request body limit.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Enables or disables permissive CORS.
    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.enable_cors = enabled;
        self
    }

    /// Enables authentication with the given secret and rejects anonymous
    /// requests.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Accepts tokens signed with `secret` but still serves anonymous
    /// requests.
    pub fn with_optional_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = false;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the lifetime of issued tokens.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Returns the token configuration, if authentication is enabled.
    pub fn auth_config(&self) -> Option<AuthConfig> {
        self.auth_secret
            .as_ref()
            .map(|secret| AuthConfig::new(secret.clone()).with_expiry(self.token_expiry))
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication is required without a secret, or
    /// a limit is zero.
    pub fn validate(&self) -> ServerResult<()> {
        if self.require_auth && self.auth_secret.as_ref().map_or(true, Vec::is_empty) {
            return Err(ServerError::Config(
                "authentication is required but no secret is set".into(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ServerError::Config("max body size must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ServerError::Config("request timeout must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}
