//! Bulk backfill processor, run on mailbox connect and manual refresh.
//!
//! Unlike the notification path, per-message failures here are logged and
//! skipped: partial success is expected and acceptable for a backfill.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::classify::ClassifyEmailJob;
use super::{JobKind, JobQueue};
use crate::db;
use crate::gmail::client::{MailboxClient, MessageRef};
use crate::gmail::parser;
use crate::models::MailboxRow;
use crate::AppState;

/// How many of the user's stored message ids the duplicate check scans.
const EXISTING_ID_SCAN_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub mailbox_id: Uuid,
    pub user_id: Uuid,
    pub max_results: Option<u32>,
}

pub async fn process(state: &AppState, kind: JobKind, data: SyncJob) -> Result<()> {
    super::run_logged(&state.pool, kind.as_str(), &data, || run(state, kind, &data)).await
}

fn default_cap(kind: JobKind) -> u32 {
    match kind {
        JobKind::ManualSync => 50,
        _ => 100,
    }
}

async fn run(state: &AppState, kind: JobKind, data: &SyncJob) -> Result<()> {
    let max_results = data.max_results.unwrap_or_else(|| default_cap(kind));

    let mut conn = state
        .pool
        .get()
        .await
        .context("Failed to get DB connection")?;

    let mailbox = db::mailboxes::get_by_id(&mut conn, data.mailbox_id)
        .await?
        .with_context(|| format!("Mailbox not found: {}", data.mailbox_id))?;

    if mailbox.user_id != data.user_id {
        bail!("Mailbox does not belong to user: {}", data.mailbox_id);
    }
    if mailbox.oauth_access_token.is_none() || mailbox.oauth_refresh_token.is_none() {
        bail!("Mailbox missing OAuth tokens: {}", data.mailbox_id);
    }

    let client = MailboxClient::from_mailbox(&state.config.google, &state.cipher, &mailbox).await?;

    tracing::info!(
        "Fetching last {} inbox messages for {}",
        max_results,
        mailbox.email_address
    );
    let listed = client.list_recent(max_results).await?;

    if listed.is_empty() {
        tracing::info!("No inbox messages found for {}", mailbox.email_address);
        return Ok(());
    }

    let existing: HashSet<String> =
        db::swipes::recent_message_ids(&mut conn, data.user_id, EXISTING_ID_SCAN_LIMIT)
            .await?
            .into_iter()
            .collect();

    let (new_messages, skipped) = split_new_messages(&listed, &existing);

    let mut queued = 0usize;
    for message in new_messages {
        match fetch_and_enqueue(&client, &state.queue, &mailbox, message).await {
            Ok(()) => queued += 1,
            Err(e) => {
                tracing::warn!("Failed to process message {}: {:#}", message.id, e);
            }
        }
    }

    tracing::info!(
        "Sync completed for {}: {} queued, {} skipped (duplicates)",
        mailbox.email_address,
        queued,
        skipped
    );

    // Last-sync moves regardless of per-message outcomes.
    db::mailboxes::touch_last_sync(&mut conn, mailbox.id).await?;

    Ok(())
}

/// Split a listing into messages that still need classification and the
/// count of already-stored duplicates.
fn split_new_messages<'a>(
    listed: &'a [MessageRef],
    existing: &HashSet<String>,
) -> (Vec<&'a MessageRef>, usize) {
    let mut new_messages = Vec::new();
    let mut skipped = 0;

    for message in listed {
        if existing.contains(&message.id) {
            skipped += 1;
        } else {
            new_messages.push(message);
        }
    }

    (new_messages, skipped)
}

async fn fetch_and_enqueue(
    client: &MailboxClient,
    queue: &JobQueue,
    mailbox: &MailboxRow,
    message: &MessageRef,
) -> Result<()> {
    let full = client.get_message(&message.id).await?;
    let parsed = parser::parse_message(&full);

    queue
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

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(ids: &[&str]) -> Vec<MessageRef> {
        ids.iter()
            .map(|id| MessageRef {
                id: id.to_string(),
                thread_id: format!("t-{}", id),
            })
            .collect()
    }

    #[test]
    fn splits_new_from_already_stored() {
        let listed = refs(&["a", "b", "c", "d", "e"]);
        let existing: HashSet<String> = ["b", "d"].iter().map(|s| s.to_string()).collect();

        let (new_messages, skipped) = split_new_messages(&listed, &existing);
        let new_ids: Vec<&str> = new_messages.iter().map(|m| m.id.as_str()).collect();

        assert_eq!(new_ids, vec!["a", "c", "e"]);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn second_run_over_unchanged_mailbox_enqueues_nothing() {
        let listed = refs(&["a", "b", "c"]);
        let existing: HashSet<String> = listed.iter().map(|m| m.id.clone()).collect();

        let (new_messages, skipped) = split_new_messages(&listed, &existing);
        assert!(new_messages.is_empty());
        assert_eq!(skipped, 3);
    }

    #[test]
    fn thirty_new_twenty_stored_counts() {
        let all_ids: Vec<String> = (0..50).map(|i| format!("m{}", i)).collect();
        let id_refs: Vec<&str> = all_ids.iter().map(|s| s.as_str()).collect();
        let listed = refs(&id_refs);
        let existing: HashSet<String> = all_ids[30..].iter().cloned().collect();

        let (new_messages, skipped) = split_new_messages(&listed, &existing);
        assert_eq!(new_messages.len(), 30);
        assert_eq!(skipped, 20);
    }

    #[test]
    fn sync_caps_default_by_kind() {
        assert_eq!(default_cap(JobKind::InitialSync), 100);
        assert_eq!(default_cap(JobKind::ManualSync), 50);
    }
}
