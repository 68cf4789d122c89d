// Database models for Diesel
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared_types::{
    CollectionResponse, EmailClassification, EmailInsights, JobLogResponse, JsonWrapper,
    MailboxResponse, SwipeResponse, TagResponse,
};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_signed_in: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::mailboxes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MailboxRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email_address: String,
    pub oauth_refresh_token: Option<String>,
    pub oauth_access_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub gmail_history_id: Option<String>,
    pub watch_expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<MailboxRow> for MailboxResponse {
    fn from(row: MailboxRow) -> Self {
        MailboxResponse {
            id: row.id,
            email_address: row.email_address,
            gmail_history_id: row.gmail_history_id,
            watch_expires_at: row.watch_expires_at,
            is_active: row.is_active,
            last_sync_at: row.last_sync_at,
            created_at: row.created_at,
        }
    }
}

/// Swipe row with JSON columns decoded at the persistence boundary.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::swipes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SwipeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mailbox_id: Uuid,
    pub gmail_message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender_email: String,
    pub sender_name: String,
    pub recipient_email: String,
    pub received_date: DateTime<Utc>,
    pub html_body: String,
    pub plain_body: String,
    pub snippet: String,
    pub is_html: bool,
    pub has_images: bool,
    pub ai_classification: Option<JsonWrapper<EmailClassification>>,
    pub ai_insights: Option<JsonWrapper<EmailInsights>>,
    pub embedding_vector_id: Option<Uuid>,
    pub is_favorite: bool,
    pub notes: Option<String>,
    pub manual_tags: Option<JsonWrapper<Vec<String>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SwipeRow> for SwipeResponse {
    fn from(row: SwipeRow) -> Self {
        SwipeResponse {
            id: row.id,
            mailbox_id: row.mailbox_id,
            gmail_message_id: row.gmail_message_id,
            thread_id: row.thread_id,
            subject: row.subject,
            sender_email: row.sender_email,
            sender_name: row.sender_name,
            recipient_email: row.recipient_email,
            received_date: row.received_date,
            html_body: row.html_body,
            plain_body: row.plain_body,
            snippet: row.snippet,
            is_html: row.is_html,
            has_images: row.has_images,
            classification: row.ai_classification.map(JsonWrapper::into_inner),
            insights: row.ai_insights.map(JsonWrapper::into_inner),
            is_favorite: row.is_favorite,
            notes: row.notes,
            manual_tags: row
                .manual_tags
                .map(JsonWrapper::into_inner)
                .unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Insertable struct for new swipes, created once by the classification job.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::swipes)]
pub struct NewSwipe {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mailbox_id: Uuid,
    pub gmail_message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender_email: String,
    pub sender_name: String,
    pub recipient_email: String,
    pub received_date: DateTime<Utc>,
    pub html_body: String,
    pub plain_body: String,
    pub snippet: String,
    pub is_html: bool,
    pub has_images: bool,
    pub ai_classification: Option<JsonWrapper<EmailClassification>>,
    pub ai_insights: Option<JsonWrapper<EmailInsights>>,
    pub embedding_vector_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::tags)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TagRow {
    pub id: Uuid,
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TagRow> for TagResponse {
    fn from(row: TagRow) -> Self {
        TagResponse {
            id: row.id,
            category: row.category,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::collections)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CollectionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CollectionRow> for CollectionResponse {
    fn from(row: CollectionRow) -> Self {
        CollectionResponse {
            id: row.id,
            name: row.name,
            description: row.description,
            is_public: row.is_public,
            created_at: row.created_at,
        }
    }
}

/// Append-only audit record of one background task.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::job_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct JobLogRow {
    pub id: Uuid,
    pub job_type: String,
    pub status: String,
    pub payload: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobLogRow> for JobLogResponse {
    fn from(row: JobLogRow) -> Self {
        JobLogResponse {
            id: row.id,
            job_type: row.job_type,
            status: row.status,
            payload: row.payload.and_then(|p| serde_json::from_str(&p).ok()),
            error: row.error,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

/// One durable queue entry. `attempts` counts deliveries, including the
/// one currently running.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::queue_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct QueueJobRow {
    pub id: Uuid,
    pub queue: String,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
