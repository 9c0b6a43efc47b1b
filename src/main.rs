use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use carepost_api::{
    app::{cors_layer, create_router, AppState, SERVICE_NAME},
    auth::{
        maintenance::spawn_session_sweeper, AuthService, PasswordService, PgSessionRepository,
        PgUserRepository, TokenService,
    },
    config::AppConfig,
    db,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("{} - Starting...", SERVICE_NAME);

    let config = AppConfig::from_env().expect("Invalid configuration");

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    let query_timeout = config.database.query_timeout();
    let tokens = Arc::new(TokenService::new(&config.jwt));
    let passwords = PasswordService::new(&config.password).expect("Invalid password hashing parameters");
    let auth = Arc::new(AuthService::new(
        Arc::new(PgUserRepository::new(pool.clone(), query_timeout)),
        Arc::new(PgSessionRepository::new(pool, query_timeout)),
        passwords,
        tokens,
    ));

    let sweeper = spawn_session_sweeper(
        Arc::clone(&auth),
        Duration::from_secs(config.session_sweep_interval_secs),
    );

    let app = create_router(AppState::new(auth))
        .layer(cors_layer(&config.server.allow_origins))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    sweeper.abort();
    tracing::info!("Server stopped");
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received");
}
