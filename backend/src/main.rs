use axum::{
    http::{header, Method, StatusCode},
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use backend::{ai, config, crypto, db, handlers, jobs, vector, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let config = Arc::new(config::AppConfig::from_env()?);

    // Establish database connection pool
    let pool = db::establish_connection_pool(&config.database_url)?;

    let cipher = Arc::new(crypto::TokenCipher::new(&config.encryption_key)?);
    let ai = Arc::new(ai::AiClient::new(config.ai.clone()));
    let vector = Arc::new(vector::VectorIndex::new(config.qdrant.clone()));
    let queue = jobs::JobQueue::new(pool.clone(), config.queue.clone());

    // Idempotent; classification jobs carry their own retries if the
    // store is still warming up.
    if let Err(e) = vector.ensure_collection().await {
        tracing::warn!("Vector store not ready at startup: {:#}", e);
    }

    let state = AppState {
        pool,
        config: config.clone(),
        cipher,
        ai,
        vector,
        queue,
    };

    // Start background queue workers
    jobs::start_workers(state.clone());

    let app = Router::new()
        .route("/health", get(health_check))
        // Webhook routes
        .route("/api/webhooks/gmail", post(handlers::webhooks::gmail_pubsub))
        // Mailbox routes
        .route("/api/mailboxes", get(handlers::mailboxes::list))
        .route("/api/mailboxes", post(handlers::mailboxes::connect))
        .route(
            "/api/mailboxes/oauth/callback",
            get(handlers::mailboxes::oauth_callback),
        )
        .route("/api/mailboxes/:id", delete(handlers::mailboxes::delete))
        .route("/api/mailboxes/:id/sync", post(handlers::mailboxes::sync))
        // Swipe routes
        .route("/api/swipes", get(handlers::swipes::list))
        .route("/api/swipes/:id", get(handlers::swipes::get))
        .route("/api/swipes/:id", put(handlers::swipes::update))
        .route("/api/swipes/:id", delete(handlers::swipes::delete))
        .route(
            "/api/swipes/:id/favorite",
            post(handlers::swipes::toggle_favorite),
        )
        .route("/api/swipes/:id/similar", get(handlers::swipes::find_similar))
        // Tag routes
        .route("/api/tags", get(handlers::tags::list))
        .route("/api/tags/:category", get(handlers::tags::by_category))
        // Collection routes
        .route("/api/collections", get(handlers::collections::list))
        .route("/api/collections", post(handlers::collections::create))
        .route(
            "/api/collections/:id",
            delete(handlers::collections::delete),
        )
        .route(
            "/api/collections/:id/swipes",
            post(handlers::collections::add_swipe),
        )
        .route(
            "/api/collections/:id/swipes/:swipe_id",
            delete(handlers::collections::remove_swipe),
        )
        // Job audit trail
        .route("/api/jobs", get(handlers::jobs::list))
        .layer(build_cors_layer())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Build CORS layer based on environment configuration.
///
/// If CORS_ALLOWED_ORIGINS is set, only those origins are allowed.
/// If not set, defaults to permissive CORS (for development only).
fn build_cors_layer() -> CorsLayer {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS").ok();

    match allowed_origins {
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS_ALLOWED_ORIGINS is set but empty, using permissive CORS (not recommended for production)"
                );
                CorsLayer::permissive()
            } else {
                tracing::info!("CORS configured for origins: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PUT,
                        Method::DELETE,
                        Method::OPTIONS,
                    ])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                    .allow_credentials(true)
            }
        }
        None => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
            );
            CorsLayer::permissive()
        }
    }
}
