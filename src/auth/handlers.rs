// HTTP handlers for authentication endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::auth::{
    error::AuthError,
    middleware::AuthenticatedUser,
    models::{
        AuthResponse, ClientInfo, LoginRequest, LogoutRequest, MessageResponse, RefreshRequest,
        RegisterRequest, RevokedSessionsResponse, TokenPair, UpdateProfileRequest, UserProfile,
    },
    service::AuthService,
};

/// Unwrap a JSON body, reporting unparseable input in the uniform error shape
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        AuthError::field("body", "invalid_json")
    })
}

/// Register a new user
/// POST /api/v1/auth/register
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or weak password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(service): State<Arc<AuthService>>,
    client: ClientInfo,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let request = json_body(payload)?;
    tracing::debug!("Registration attempt");

    let response = service.register(request, &client).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Login a user
/// POST /api/v1/auth/login
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    client: ClientInfo,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let request = json_body(payload)?;
    let response = service.login(request, &client).await?;
    Ok(Json(response))
}

/// Refresh tokens
/// POST /api/v1/auth/refresh
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 400, description = "Missing refresh token", body = ErrorResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh_handler(
    State(service): State<Arc<AuthService>>,
    client: ClientInfo,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, AuthError> {
    let request = json_body(payload)?;
    let pair = service.refresh(&request.refresh_token, &client).await?;
    Ok(Json(pair))
}

/// End a session
/// POST /api/v1/auth/logout
///
/// The refresh token comes from the body, or else from the Authorization
/// header. Always succeeds.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body(content = LogoutRequest, description = "Optional refresh token"),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout_handler(
    State(service): State<Arc<AuthService>>,
    headers: HeaderMap,
    payload: Option<Json<LogoutRequest>>,
) -> Json<MessageResponse> {
    let body_token = payload.and_then(|Json(body)| body.refresh_token);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    service.logout(body_token.as_deref(), authorization).await;

    Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    })
}

/// Revoke every session of the calling user
/// POST /api/v1/auth/logout-all
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout-all",
    responses(
        (status = 200, description = "Sessions revoked", body = RevokedSessionsResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout_all_handler(
    State(service): State<Arc<AuthService>>,
    user: AuthenticatedUser,
) -> Result<Json<RevokedSessionsResponse>, AuthError> {
    let revoked_sessions = service.logout_all(user.user_id).await?;
    Ok(Json(RevokedSessionsResponse { revoked_sessions }))
}

/// Get current user information (protected endpoint)
/// GET /api/v1/users/me
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn me_handler(
    State(service): State<Arc<AuthService>>,
    user: AuthenticatedUser,
) -> Result<Json<UserProfile>, AuthError> {
    let profile = service.get_current_user(user.user_id).await?;
    Ok(Json(profile))
}

/// Update the current user's display name
/// PATCH /api/v1/users/me
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated user", body = UserProfile),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_me_handler(
    State(service): State<Arc<AuthService>>,
    user: AuthenticatedUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserProfile>, AuthError> {
    let request = json_body(payload)?;
    let profile = service.update_profile(user.user_id, request).await?;
    Ok(Json(profile))
}
