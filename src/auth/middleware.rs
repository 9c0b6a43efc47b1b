// Authentication middleware for protected routes

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{ClientInfo, Role},
    token::TokenService,
};

/// Identity established for the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Extract the token from a `Bearer <token>` header value
///
/// The value must split on a single space into exactly the scheme and
/// a non-empty token.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Authenticate a request from its Authorization header value
///
/// Missing header, wrong shape and token rejection all yield the same
/// `Unauthorized` error.
pub fn authenticate(
    tokens: &TokenService,
    authorization: Option<&str>,
) -> Result<AuthenticatedUser, AuthError> {
    let Some(value) = authorization else {
        debug!("Missing Authorization header");
        return Err(AuthError::Unauthorized);
    };

    let token = bearer_token(value).ok_or_else(|| {
        debug!("Authorization header is not a bearer credential");
        AuthError::Unauthorized
    })?;

    let claims = tokens
        .validate_access_token(token)
        .map_err(|_| AuthError::Unauthorized)?;
    let user_id = claims.user_id().map_err(|_| AuthError::Unauthorized)?;

    Ok(AuthenticatedUser {
        user_id,
        email: claims.email,
        role: claims.role,
    })
}

/// Check that the user holds one of the allowed roles
pub fn authorize(user: &AuthenticatedUser, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        warn!(
            "Authorization failed: user_id={}, role={}, allowed={:?}",
            user.user_id, user.role, allowed
        );
        Err(AuthError::Forbidden)
    }
}

fn authorization_header(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Middleware that rejects unauthenticated requests and stores the
/// identity in request extensions for downstream handlers
pub async fn require_auth(
    State(tokens): State<Arc<TokenService>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();

    let user = authenticate(&tokens, authorization_header(&parts)).map_err(|e| {
        warn!("Rejected unauthenticated request to {}", parts.uri.path());
        e
    })?;

    parts.extensions.insert(user);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let tokens = Arc::<TokenService>::from_ref(state);
        authenticate(&tokens, authorization_header(parts))
    }
}

/// Authorization middleware that requires one of a set of roles
///
/// Must run after [`require_auth`], which supplies the identity.
#[derive(Debug, Clone)]
pub struct RequireRole {
    allowed: Vec<Role>,
}

impl RequireRole {
    pub fn new(allowed: impl Into<Vec<Role>>) -> Self {
        Self {
            allowed: allowed.into(),
        }
    }

    pub fn caregiver() -> Self {
        Self::new(vec![Role::Caregiver])
    }

    /// Middleware function that validates role-based access
    pub async fn middleware(self, request: Request, next: Next) -> Result<Response, AuthError> {
        let user = request
            .extensions()
            .get::<AuthenticatedUser>()
            .ok_or(AuthError::Unauthorized)?;

        authorize(user, &self.allowed)?;

        debug!(
            "Authorization successful: user_id={}, role={}, endpoint={}",
            user.user_id,
            user.role,
            request.uri().path()
        );
        Ok(next.run(request).await)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    /// User agent plus the originating address: first X-Forwarded-For hop,
    /// else the socket peer
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());

        let ip_address = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();

        Ok(ClientInfo {
            user_agent,
            ip_address,
        })
    }
}
