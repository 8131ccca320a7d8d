//! Bearer token authentication.
//!
//! Tokens are signed with HMAC-SHA256 and carry their own expiry, so the
//! server keeps no session state.
//!
//! ## Token Format
//!
//! ```text
//! <base64url(user id)>.<expiry, unix seconds>.<base64url(HMAC-SHA256 of the first two parts)>
//! ```
//!
//! Clients send the token as `Authorization: Bearer <token>` or in the
//! `X-ZUMO-AUTH` header.

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use datasync_core::Identity;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token lifetime.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration with a 24 hour token lifetime.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token lifetime.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and checks bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for `user_id` that expires after the configured
    /// lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key is unusable.
    pub fn create_token(&self, user_id: &str) -> ServerResult<String> {
        let expires_at = unix_now().saturating_add(self.config.token_expiry.as_secs());
        self.create_token_expiring_at(user_id, expires_at)
    }

    /// Creates a token for `user_id` that expires at `expires_at`
    /// (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key is unusable.
    pub fn create_token_expiring_at(&self, user_id: &str, expires_at: u64) -> ServerResult<String> {
        let claims = format!("{}.{expires_at}", URL_SAFE_NO_PAD.encode(user_id));
        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{claims}.{signature}"))
    }

    /// Validates a token and returns the identity it was issued to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AuthenticationFailed`] for malformed, forged
    /// or expired tokens.
    pub fn validate(&self, token: &str) -> ServerResult<Identity> {
        let failed = |reason: &str| ServerError::AuthenticationFailed(reason.to_string());

        let (claims, signature) = token.rsplit_once('.').ok_or_else(|| failed("malformed token"))?;
        let (user, expiry) = claims.split_once('.').ok_or_else(|| failed("malformed token"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| failed("malformed signature"))?;
        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| failed("invalid signature"))?;

        let expires_at: u64 = expiry.parse().map_err(|_| failed("malformed expiry"))?;
        if unix_now() >= expires_at {
            return Err(failed("token expired"));
        }

        let user = URL_SAFE_NO_PAD
            .decode(user)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .filter(|user| !user.is_empty())
            .ok_or_else(|| failed("malformed user id"))?;
        Ok(Identity::user(user))
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("invalid HMAC key: {e}")))
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("token_expiry", &self.config.token_expiry)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Extracts a bearer token from request header values.
pub(crate) fn bearer_token<'a>(authorization: Option<&'a str>, zumo_auth: Option<&'a str>) -> Option<&'a str> {
    let from_authorization = authorization.and_then(|value| {
        let (scheme, token) = value.trim().split_once(' ')?;
        scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
    });
    from_authorization
        .or_else(|| zumo_auth.map(str::trim))
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TokenValidator {
        TokenValidator::new(AuthConfig::new(b"test-secret-key-32-bytes-long!!".to_vec()))
    }

    #[test]
    fn create_and_validate_token() {
        let validator = validator();
        let token = validator.create_token("alice").unwrap();
        assert_eq!(token.split('.').count(), 3);

        let identity = validator.validate(&token).unwrap();
        assert_eq!(identity.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn reject_tampered_token() {
        let validator = validator();
        let token = validator.create_token("alice").unwrap();
        let (_, rest) = token.split_once('.').unwrap();
        let forged = format!("{}.{rest}", URL_SAFE_NO_PAD.encode("mallory"));
        assert!(validator.validate(&forged).is_err());
    }

    #[test]
    fn reject_other_secret() {
        let token = validator().create_token("alice").unwrap();
        let other = TokenValidator::new(AuthConfig::new(b"another-secret".to_vec()));
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn reject_expired_token() {
        let validator = TokenValidator::new(
            AuthConfig::new(b"test-secret-key-32-bytes-long!!".to_vec()).with_expiry(Duration::ZERO),
        );
        let token = validator.create_token("alice").unwrap();
        assert!(matches!(
            validator.validate(&token),
            Err(ServerError::AuthenticationFailed(_))
        ));

        let past = validator.create_token_expiring_at("alice", 1_000).unwrap();
        assert!(validator.validate(&past).is_err());
    }

    #[test]
    fn reject_malformed_tokens() {
        let validator = validator();
        for token in ["", "abc", "a.b", "a.b.c", "!!.1.x"] {
            assert!(validator.validate(token).is_err(), "{token:?} should fail");
        }
    }

    #[test]
    fn bearer_token_sources() {
        assert_eq!(bearer_token(Some("Bearer abc"), None), Some("abc"));
        assert_eq!(bearer_token(Some("bearer  abc "), None), Some("abc"));
        assert_eq!(bearer_token(Some("Basic abc"), Some("zumo")), Some("zumo"));
        assert_eq!(bearer_token(None, Some("zumo")), Some("zumo"));
        assert_eq!(bearer_token(None, Some("  ")), None);
        assert_eq!(bearer_token(None, None), None);
    }
}
