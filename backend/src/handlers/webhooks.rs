//! Gmail Pub/Sub webhook endpoint.
//!
//! A malformed envelope gets a 400. A well-formed one is always
//! acknowledged with 200 — even when enqueueing fails internally — so the
//! push system never retries a message this service processes through its
//! own queue.

use axum::{extract::State, http::StatusCode, Json};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::jobs::notification::EmailNotificationJob;
use crate::jobs::JobKind;
use crate::AppState;

/// Pub/Sub push envelope. Field presence is checked by hand so a missing
/// field yields a controlled 400 rather than an extractor rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct PubSubPush {
    pub message: Option<PubSubMessage>,
    #[allow(dead_code)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PubSubMessage {
    pub data: Option<String>,
    #[serde(rename = "messageId")]
    #[allow(dead_code)]
    pub message_id: Option<String>,
    #[serde(rename = "publishTime")]
    #[allow(dead_code)]
    pub publish_time: Option<String>,
}

/// Decoded notification payload. Gmail serializes the history id as a
/// number, but some relays re-encode it as a string; accept both.
#[derive(Debug, Deserialize)]
struct GmailNotification {
    #[serde(rename = "emailAddress")]
    email_address: String,
    #[serde(rename = "historyId")]
    history_id: HistoryId,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryId {
    Number(u64),
    Text(String),
}

impl HistoryId {
    fn into_string(self) -> String {
        match self {
            HistoryId::Number(n) => n.to_string(),
            HistoryId::Text(s) => s,
        }
    }
}

pub async fn gmail_pubsub(
    State(state): State<AppState>,
    Json(body): Json<PubSubPush>,
) -> (StatusCode, Json<Value>) {
    tracing::info!("Received Gmail Pub/Sub notification");

    let job = match decode_push(&body) {
        Ok(job) => job,
        Err(reason) => {
            tracing::error!("Invalid Pub/Sub push: {}", reason);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })));
        }
    };

    tracing::info!(
        "Processing notification for {}, history id {}",
        job.email_address,
        job.history_id
    );

    // The mailbox is not validated here; that happens inside the async
    // job, after the push has been acknowledged.
    match state.queue.enqueue(JobKind::EmailNotification, &job).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => {
            tracing::error!("Failed to enqueue notification job: {:#}", e);
            (
                StatusCode::OK,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}

fn decode_push(body: &PubSubPush) -> Result<EmailNotificationJob, &'static str> {
    let message = body.message.as_ref().ok_or("Invalid message format")?;
    let data = message.data.as_deref().ok_or("Invalid message format")?;

    let decoded = BASE64.decode(data).map_err(|_| "Invalid message format")?;
    let notification: GmailNotification =
        serde_json::from_slice(&decoded).map_err(|_| "Missing required fields")?;

    if notification.email_address.is_empty() {
        return Err("Missing required fields");
    }
    let history_id = notification.history_id.into_string();
    if history_id.is_empty() {
        return Err("Missing required fields");
    }

    Ok(EmailNotificationJob {
        email_address: notification.email_address,
        history_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_with_data(data: Option<&str>) -> PubSubPush {
        PubSubPush {
            message: Some(PubSubMessage {
                data: data.map(|s| s.to_string()),
                message_id: Some("m-1".to_string()),
                publish_time: Some("2025-07-01T00:00:00Z".to_string()),
            }),
            subscription: Some("projects/p/subscriptions/s".to_string()),
        }
    }

    fn encode(payload: &str) -> String {
        BASE64.encode(payload)
    }

    #[test]
    fn decodes_well_formed_push() {
        let push = push_with_data(Some(&encode(
            r#"{"emailAddress":"a@b.com","historyId":"42"}"#,
        )));

        let job = decode_push(&push).unwrap();
        assert_eq!(job.email_address, "a@b.com");
        assert_eq!(job.history_id, "42");
    }

    #[test]
    fn accepts_numeric_history_id() {
        let push = push_with_data(Some(&encode(
            r#"{"emailAddress":"a@b.com","historyId":98765}"#,
        )));

        let job = decode_push(&push).unwrap();
        assert_eq!(job.history_id, "98765");
    }

    #[test]
    fn rejects_missing_message() {
        let push = PubSubPush {
            message: None,
            subscription: None,
        };
        assert_eq!(decode_push(&push), Err("Invalid message format"));
    }

    #[test]
    fn rejects_missing_data() {
        let push = push_with_data(None);
        assert_eq!(decode_push(&push), Err("Invalid message format"));
    }

    #[test]
    fn rejects_invalid_base64() {
        let push = push_with_data(Some("!!! not base64 !!!"));
        assert_eq!(decode_push(&push), Err("Invalid message format"));
    }

    #[test]
    fn rejects_payload_without_email_address() {
        let push = push_with_data(Some(&encode(r#"{"historyId":"42"}"#)));
        assert_eq!(decode_push(&push), Err("Missing required fields"));
    }

    #[test]
    fn rejects_payload_without_history_id() {
        let push = push_with_data(Some(&encode(r#"{"emailAddress":"a@b.com"}"#)));
        assert_eq!(decode_push(&push), Err("Missing required fields"));
    }
}
