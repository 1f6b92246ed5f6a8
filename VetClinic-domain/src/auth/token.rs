use std::env;
use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::token_blacklist;
use crate::auth::Claims;

/// Security errors for authentication and token operations
#[derive(Debug, Error)]
pub enum SecurityError {
    /// JWT validation error
    #[error("Token validation error: {0}")]
    TokenValidation(String),

    /// Expired token
    #[error("Token has expired")]
    TokenExpired,

    /// Invalid token structure
    #[error("Invalid token format")]
    InvalidToken,

    /// Configuration error
    #[error("Security configuration error: {0}")]
    ConfigError(String),

    /// Token has been revoked
    #[error("Token has been revoked")]
    TokenRevoked,

    /// Invalid issuer
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// Stored password hash cannot be parsed
    #[error("Malformed password hash")]
    MalformedHash,
}

/// Token settings read from the environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub access_token_minutes: i64,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>, issuer: impl Into<String>, access_token_minutes: i64) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            issuer: issuer.into(),
            access_token_minutes,
        }
    }

    /// Load `JWT_SECRET`, `JWT_ISSUER` and `ACCESS_TOKEN_EXPIRATION_MINUTES`
    pub fn from_env() -> Result<Self, SecurityError> {
        let jwt_secret = env::var("JWT_SECRET").map_err(|e| {
            error!("JWT_SECRET environment variable not found: {}", e);
            SecurityError::ConfigError("JWT_SECRET environment variable not found".to_string())
        })?;
        if jwt_secret.trim().is_empty() {
            return Err(SecurityError::ConfigError("JWT_SECRET is empty".to_string()));
        }

        let issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "vet-clinic-api".to_string());
        let access_token_minutes = env::var("ACCESS_TOKEN_EXPIRATION_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|m| *m > 0)
            .unwrap_or(60);

        Ok(Self::new(jwt_secret, issuer, access_token_minutes))
    }

    /// Lifetime of an access token in seconds
    pub fn expires_in(&self) -> i64 {
        self.access_token_minutes * 60
    }
}

/// Generate a signed access token for `user_id`
pub fn generate_token(config: &AuthConfig, user_id: i64) -> Result<(String, Claims), SecurityError> {
    let now = Utc::now();
    let expiration = now + Duration::minutes(config.access_token_minutes);

    let claims = Claims {
        sub: user_id.to_string(),
        iss: config.issuer.clone(),
        iat: now.timestamp(),
        exp: expiration.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Failed to encode JWT token: {}", e);
        SecurityError::TokenValidation(e.to_string())
    })?;

    // Log token generation (but not the token itself)
    info!("Generated access token for user {}", user_id);
    debug!("Token expiration: {}", expiration);

    Ok((token, claims))
}

/// Validate a JWT token and return the decoded claims
pub fn validate_token(config: &AuthConfig, token: &str) -> Result<Claims, SecurityError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_issuer(&[config.issuer.as_str()]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
        jsonwebtoken::errors::ErrorKind::InvalidToken => SecurityError::InvalidToken,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => SecurityError::InvalidIssuer,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => {
            SecurityError::TokenValidation("Invalid signature".to_string())
        }
        _ => SecurityError::TokenValidation(e.to_string()),
    })?;

    if token_blacklist::blacklist().is_revoked(&token_data.claims.jti) {
        warn!("Rejected revoked token {}", token_data.claims.jti);
        return Err(SecurityError::TokenRevoked);
    }

    Ok(token_data.claims)
}

/// Revoke one token until it would have expired anyway
pub fn revoke_token(claims: &Claims) {
    let expiration = UNIX_EPOCH + StdDuration::from_secs(claims.exp.max(0) as u64);
    let expiration = expiration.max(SystemTime::now());
    info!("Revoking token {} of user {}", claims.jti, claims.sub);
    token_blacklist::blacklist().revoke_token(&claims.jti, expiration);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new("test_secret_key_for_testing_only", "test-issuer", 15)
    }

    #[test]
    fn test_generate_and_validate_token() {
        let (token, issued) = generate_token(&config(), 42).unwrap();
        assert!(!token.is_empty());

        let claims = validate_token(&config(), &token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_token_expiration() {
        let claims = Claims {
            sub: "7".to_string(),
            iss: "test-issuer".to_string(),
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config().jwt_secret.as_bytes()),
        )
        .unwrap();

        match validate_token(&config(), &token) {
            Err(SecurityError::TokenExpired) => {}
            other => panic!("Expected TokenExpired error but got: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_issuer_and_secret() {
        let (token, _) = generate_token(&config(), 1).unwrap();

        let other_issuer = AuthConfig::new("test_secret_key_for_testing_only", "someone-else", 15);
        assert!(matches!(
            validate_token(&other_issuer, &token),
            Err(SecurityError::InvalidIssuer)
        ));

        let other_secret = AuthConfig::new("another_secret", "test-issuer", 15);
        assert!(validate_token(&other_secret, &token).is_err());
    }

    #[test]
    fn test_invalid_token() {
        match validate_token(&config(), "invalid.token.format") {
            Err(SecurityError::InvalidToken) | Err(SecurityError::TokenValidation(_)) => {}
            other => panic!("Expected InvalidToken or TokenValidation error, got {:?}", other),
        }
    }

    #[test]
    fn test_revoked_token_is_rejected() {
        let (token, claims) = generate_token(&config(), 5).unwrap();
        revoke_token(&claims);

        assert!(matches!(
            validate_token(&config(), &token),
            Err(SecurityError::TokenRevoked)
        ));

        let (fresh, _) = generate_token(&config(), 5).unwrap();
        assert!(validate_token(&config(), &fresh).is_ok());
    }
}
