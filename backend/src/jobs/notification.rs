//! Provider push-notification processor.
//!
//! Turns one Pub/Sub notification into a history diff of new inbox
//! messages and enqueues a classification job per message.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::classify::ClassifyEmailJob;
use super::JobKind;
use crate::db;
use crate::gmail::client::{AddedMessage, HistoryDiff, MailboxClient};
use crate::gmail::parser;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailNotificationJob {
    pub email_address: String,
    pub history_id: String,
}

pub async fn process(state: &AppState, data: EmailNotificationJob) -> Result<()> {
    super::run_logged(
        &state.pool,
        JobKind::EmailNotification.as_str(),
        &data,
        || run(state, &data),
    )
    .await
}

async fn run(state: &AppState, data: &EmailNotificationJob) -> Result<()> {
    let mut conn = state
        .pool
        .get()
        .await
        .context("Failed to get DB connection")?;

    let mailbox = db::mailboxes::get_by_email(&mut conn, &data.email_address)
        .await?
        .with_context(|| format!("Mailbox not found: {}", data.email_address))?;

    if mailbox.oauth_access_token.is_none() || mailbox.oauth_refresh_token.is_none() {
        bail!("Mailbox missing OAuth tokens: {}", data.email_address);
    }

    let client = MailboxClient::from_mailbox(&state.config.google, &state.cipher, &mailbox).await?;

    let cursor = mailbox
        .gmail_history_id
        .clone()
        .unwrap_or_else(|| data.history_id.clone());

    match client.history_since(&cursor).await? {
        HistoryDiff::Changes(added) => {
            for message in added.iter().filter(|m| is_inbox(m)) {
                let full = client.get_message(&message.id).await?;
                let parsed = parser::parse_message(&full);

                state
                    .queue
                    .enqueue(
                        JobKind::AiClassification,
                        &ClassifyEmailJob {
                            mailbox_id: mailbox.id,
                            user_id: mailbox.user_id,
                            gmail_message_id: message.id.clone(),
                            thread_id: message.thread_id.clone(),
                            parsed,
                        },
                    )
                    .await?;
            }
        }
        HistoryDiff::CursorExpired => {
            tracing::warn!(
                "History cursor expired for {}; a manual sync is needed to backfill",
                data.email_address
            );
        }
    }

    // The cursor moves once per notification, after the whole loop. A
    // mid-loop failure above leaves it untouched and retries the batch.
    db::mailboxes::update_cursor(&mut conn, mailbox.id, &data.history_id).await?;

    Ok(())
}

/// Only messages landing in the inbox are captured.
fn is_inbox(message: &AddedMessage) -> bool {
    message.label_ids.iter().any(|label| label == "INBOX")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(labels: &[&str]) -> AddedMessage {
        AddedMessage {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            label_ids: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn only_inbox_messages_pass_the_label_filter() {
        assert!(is_inbox(&added(&["INBOX", "UNREAD"])));
        assert!(!is_inbox(&added(&["SPAM"])));
        assert!(!is_inbox(&added(&[])));
        // Label matching is exact, not case-folded.
        assert!(!is_inbox(&added(&["inbox"])));
    }

    #[test]
    fn notification_payload_round_trips() {
        let job = EmailNotificationJob {
            email_address: "a@b.com".to_string(),
            history_id: "42".to_string(),
        };
        let json = serde_json::to_string(&job).unwrap();
        let parsed: EmailNotificationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.email_address, "a@b.com");
        assert_eq!(parsed.history_id, "42");
    }
}
