pub mod ai;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod gmail;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod schema;
pub mod vector;

use std::sync::Arc;

use ai::AiClient;
use config::AppConfig;
use crypto::TokenCipher;
use db::DbPool;
use jobs::JobQueue;
use vector::VectorIndex;

/// Shared application state: the connection pool plus explicitly
/// constructed, process-scoped external clients. Built once at startup and
/// injected into handlers and workers.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub cipher: Arc<TokenCipher>,
    pub ai: Arc<AiClient>,
    pub vector: Arc<VectorIndex>,
    pub queue: JobQueue,
}
