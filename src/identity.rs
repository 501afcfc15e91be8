use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing or malformed authorization header")]
    MissingCredentials,
    #[error("Invalid auth token")]
    InvalidToken,
    #[error("Auth token expired")]
    Expired,
    #[error("Could not issue auth token: {0}")]
    Issue(String),
}

/// Verifies bearer tokens and issues new ones.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Returns the username the token was issued to.
    fn authenticate(&self, token: &str) -> Result<String, AuthError>;

    fn issue_token(&self, username: &str) -> Result<String, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// HS256 JWTs signed with a shared secret.
pub struct JwtIdentityProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl IdentityProvider for JwtIdentityProvider {
    fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
                tracing::debug!("Rejected expired auth token");
                Err(AuthError::Expired)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Rejected invalid auth token");
                Err(AuthError::InvalidToken)
            }
        }
    }

    fn issue_token(&self, username: &str) -> Result<String, AuthError> {
        let iat = unix_now();
        let claims = Claims {
            sub: username.to_string(),
            iat,
            exp: iat + self.ttl.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingCredentials)?;
    let (scheme, token) = value.trim().split_once(' ').ok_or(AuthError::MissingCredentials)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough";

    #[test]
    fn issued_token_authenticates() {
        let provider = JwtIdentityProvider::new(SECRET, Duration::from_secs(60));
        let token = provider.issue_token("alice").unwrap();
        assert_eq!(provider.authenticate(&token).unwrap(), "alice");
    }

    #[test]
    fn token_from_another_secret_is_invalid() {
        let issuer = JwtIdentityProvider::new("some-other-secret-value", Duration::from_secs(60));
        let provider = JwtIdentityProvider::new(SECRET, Duration::from_secs(60));
        let token = issuer.issue_token("alice").unwrap();
        assert_eq!(provider.authenticate(&token), Err(AuthError::InvalidToken));
        assert_eq!(provider.authenticate("not-a-jwt"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn expired_token_is_distinguished() {
        let provider = JwtIdentityProvider::new(SECRET, Duration::from_secs(60));
        // Well past the default validation leeway.
        let claims = Claims {
            sub: "alice".to_string(),
            iat: unix_now() - 7_200,
            exp: unix_now() - 3_600,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        assert_eq!(provider.authenticate(&token), Err(AuthError::Expired));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Ok("abc.def"));
        assert_eq!(bearer_token(Some("bearer  abc")), Ok("abc"));
        assert_eq!(bearer_token(None), Err(AuthError::MissingCredentials));
        assert_eq!(bearer_token(Some("Basic abc")), Err(AuthError::MissingCredentials));
        assert_eq!(bearer_token(Some("Bearer")), Err(AuthError::MissingCredentials));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthError::MissingCredentials));
    }
}
