use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// HMAC-SHA2 family accepted for bearer tokens. Anything else is refused
/// even if the signature would verify under it.
pub const ACCEPTED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Verified token claims, carried opaquely; nothing downstream inspects them.
pub type Claims = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("{0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct IssuedClaims {
    sub: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Strips the `Bearer ` scheme from a raw `Authorization` header value.
pub fn bearer_token(header_value: Option<&str>) -> Result<&str, AuthError> {
    let token = header_value
        .map(|h| h.strip_prefix("Bearer ").unwrap_or(h))
        .map(str::trim)
        .unwrap_or_default();

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

fn hmac_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
    // exp/nbf are still checked when the token carries them
    validation.required_spec_claims = HashSet::new();
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &hmac_validation(),
    )?;

    Ok(token_data.claims)
}

/// Full gate: header value in, verified claims out.
pub fn authenticate(header_value: Option<&str>, secret: &str) -> Result<Claims, AuthError> {
    let token = bearer_token(header_value)?;
    validate_jwt(token, secret)
}

/// Signs an HS256 token for `subject`. Used by the `mint-token` tool and tests.
pub fn issue_token(subject: &str, secret: &str, ttl: Duration) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = IssuedClaims {
        sub: subject.to_owned(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(AuthError::Signing)
}
