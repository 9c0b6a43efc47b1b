// JWT token generation and validation service

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::auth::{error::AuthError, models::Role};
use crate::config::JwtConfig;

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String, // user_id
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)
    }
}

/// Refresh token claims
///
/// `jti` makes every refresh token unique, even two issued to the same
/// user within one second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Token service for JWT operations
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    secret_configured: bool,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a TokenService from configuration
    /// Lifetimes are access minutes and refresh hours
    pub fn new(config: &JwtConfig) -> Self {
        Self::with_ttls(
            &config.secret,
            Duration::minutes(config.access_ttl_minutes),
            Duration::hours(config.refresh_ttl_hours),
        )
    }

    pub fn with_ttls(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            secret_configured: !secret.is_empty(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Generate an access token
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, AuthError> {
        let now = Utc::now();

        let claims = AccessClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };

        self.sign(&claims)
    }

    /// Generate a refresh token, returning it with its absolute expiry
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<(String, DateTime<Utc>), AuthError> {
        let now = Utc::now();
        let expires_at = now + self.refresh_ttl;

        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = self.sign(&claims)?;
        Ok((token, expires_at))
    }

    /// Validate an access token
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims: AccessClaims = self.verify(token)?;
        claims.user_id()?;
        Ok(claims)
    }

    /// Validate a refresh token, returning the user it was issued to
    pub fn validate_refresh_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims: RefreshClaims = self.verify(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        if !self.secret_configured {
            return Err(AuthError::Signing(ErrorKind::InvalidKeyFormat.into()));
        }

        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(AuthError::Signing)
    }

    /// Internal helper to validate any token
    ///
    /// Only HMAC algorithms are accepted, with zero clock leeway. Every
    /// failure collapses to `InvalidToken`.
    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token rejected: {:?}", e.kind());
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
pub(crate) fn test_token_service() -> TokenService {
    TokenService::with_ttls(
        "test_secret_key_for_testing_purposes",
        Duration::minutes(15),
        Duration::hours(168),
    )
}
