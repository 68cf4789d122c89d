use anyhow::{Context, Result};
use std::env;

/// Configuration for external services, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub google: GoogleConfig,
    pub ai: AiConfig,
    pub qdrant: QdrantConfig,
    pub queue: QueueConfig,
    pub encryption_key: String,
    pub jwt_secret: String,
    pub cookie_name: String,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub pubsub_project_id: String,
    pub pubsub_topic: String,
}

impl GoogleConfig {
    /// Fully qualified Pub/Sub topic name used when registering a watch.
    pub fn topic_name(&self) -> String {
        format!(
            "projects/{}/topics/{}",
            self.pubsub_project_id, self.pubsub_topic
        )
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection_name: String,
}

/// Tuning for the durable job queue workers.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delivery attempts before a job is marked failed
    pub max_attempts: i32,
    /// First retry delay; doubles on each subsequent attempt
    pub backoff_base_secs: u64,
    /// Concurrent email-notification/sync jobs
    pub notification_concurrency: usize,
    /// Concurrent AI classification jobs
    pub classification_concurrency: usize,
    /// How often idle workers look for due jobs
    pub poll_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            google: GoogleConfig {
                client_id: env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID must be set")?,
                client_secret: env::var("GOOGLE_CLIENT_SECRET")
                    .context("GOOGLE_CLIENT_SECRET must be set")?,
                redirect_uri: env::var("GOOGLE_REDIRECT_URI").unwrap_or_else(|_| {
                    "http://localhost:3000/api/mailboxes/oauth/callback".to_string()
                }),
                pubsub_project_id: env::var("GOOGLE_PUBSUB_PROJECT_ID").unwrap_or_default(),
                pubsub_topic: env::var("GOOGLE_PUBSUB_TOPIC")
                    .unwrap_or_else(|_| "gmail-notifications".to_string()),
            },
            ai: AiConfig {
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                embedding_model: env::var("OPENAI_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            },
            qdrant: QdrantConfig {
                url: env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string()),
                api_key: env::var("QDRANT_API_KEY").ok(),
                collection_name: env::var("QDRANT_COLLECTION")
                    .unwrap_or_else(|_| "email_swipes".to_string()),
            },
            queue: QueueConfig::from_env(),
            encryption_key: env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            cookie_name: env::var("AUTH_COOKIE_NAME").unwrap_or_else(|_| "auth_token".to_string()),
        })
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let max_attempts = env::var("QUEUE_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let backoff_base_secs = env::var("QUEUE_BACKOFF_BASE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        let notification_concurrency = env::var("QUEUE_NOTIFICATION_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let classification_concurrency = env::var("QUEUE_CLASSIFICATION_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let poll_interval_secs = env::var("QUEUE_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        Self {
            max_attempts,
            backoff_base_secs,
            notification_concurrency,
            classification_concurrency,
            poll_interval_secs,
        }
    }
}
