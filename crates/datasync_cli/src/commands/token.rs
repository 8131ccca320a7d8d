//! Token command implementation.

use datasync_server::{AuthConfig, TokenValidator};
use std::time::Duration;

/// Runs the token command, printing the token.
pub fn run(secret: &str, user: &str, ttl_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", issue(secret, user, ttl_secs)?);
    Ok(())
}

fn issue(secret: &str, user: &str, ttl_secs: u64) -> Result<String, Box<dyn std::error::Error>> {
    if secret.is_empty() {
        return Err("secret must not be empty".into());
    }
    let config = AuthConfig::new(secret.as_bytes().to_vec()).with_expiry(Duration::from_secs(ttl_secs));
    Ok(TokenValidator::new(config).create_token(user)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_validate() {
        let token = issue("s3cret", "alice", 60).unwrap();
        let validator = TokenValidator::new(AuthConfig::new(b"s3cret".to_vec()));
        assert_eq!(validator.validate(&token).unwrap().user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(issue("", "alice", 60).is_err());
    }
}
