// Router assembly and shared application state

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi, ToSchema,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{
    handlers::{
        self, login_handler, logout_all_handler, logout_handler, me_handler, refresh_handler,
        register_handler, update_me_handler,
    },
    models::{
        AuthResponse, LoginRequest, LogoutRequest, MessageResponse, PublicUser, RefreshRequest,
        RegisterRequest, RevokedSessionsResponse, Role, TokenPair, UpdateProfileRequest,
        UserProfile,
    },
    require_auth, AuthService, TokenService,
};
use crate::error::ErrorResponse;

pub const SERVICE_NAME: &str = "carepost-api";

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        handlers::register_handler,
        handlers::login_handler,
        handlers::refresh_handler,
        handlers::logout_handler,
        handlers::logout_all_handler,
        handlers::me_handler,
        handlers::update_me_handler,
    ),
    components(
        schemas(
            AuthResponse, LoginRequest, LogoutRequest, MessageResponse, PublicUser,
            RefreshRequest, RegisterRequest, RevokedSessionsResponse, Role, TokenPair,
            UpdateProfileRequest, UserProfile, ErrorResponse, HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and session endpoints"),
        (name = "users", description = "Current user endpoints"),
        (name = "health", description = "Liveness check")
    ),
    info(
        title = "CarePost API",
        version = "1.0.0",
        description = "Credential and session management API"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>) -> Self {
        let tokens = auth.tokens();
        Self { auth, tokens }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.auth)
    }
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.tokens)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "carepost-api")]
    pub service: String,
}

/// Handler for GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// CORS policy for the configured origins; `*` allows any origin
pub fn cors_layer(allow_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if allow_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Creates and configures the application router
pub fn create_router(state: AppState) -> Router {
    let public: Router<AppState> = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/logout", post(logout_handler));

    let protected: Router<AppState> = Router::new()
        .route("/auth/logout-all", post(logout_all_handler))
        .route("/users/me", get(me_handler).patch(update_me_handler))
        .route_layer(from_fn_with_state(state.tokens.clone(), require_auth));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_handler))
        .nest("/api/v1", public.merge(protected))
        .with_state(state)
}
