//! Gmail API client wrapping OAuth and the provider operations the
//! ingestion pipeline needs.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use google_gmail1::api::{Message, WatchRequest};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::GoogleConfig;
use crate::crypto::TokenCipher;
use crate::models::MailboxRow;

/// Tokens returned by the authorization-code exchange.
#[derive(Debug, Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Server-side push subscription registered for a mailbox.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    pub history_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Id pair from a message listing.
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

/// One "message added" event from a history diff.
#[derive(Debug, Clone)]
pub struct AddedMessage {
    pub id: String,
    pub thread_id: String,
    pub label_ids: Vec<String>,
}

/// Result of a history diff. An expired cursor is a distinct outcome, not
/// an error: it signals the caller to fall back to a full resync.
#[derive(Debug)]
pub enum HistoryDiff {
    Changes(Vec<AddedMessage>),
    CursorExpired,
}

/// Build the consent URL the user is sent to when connecting a mailbox.
pub fn auth_url(config: &GoogleConfig, state: &str) -> String {
    format!(
        "https://accounts.google.com/o/oauth2/v2/auth?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         scope=https://www.googleapis.com/auth/gmail.readonly&\
         access_type=offline&\
         prompt=consent&\
         state={}",
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(state),
    )
}

/// Exchange an authorization code for an access/refresh token pair.
pub async fn exchange_code(config: &GoogleConfig, code: &str) -> Result<OAuthTokens> {
    #[derive(Serialize)]
    struct TokenRequest<'a> {
        code: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        redirect_uri: &'a str,
        grant_type: &'a str,
    }

    #[derive(Deserialize, Debug)]
    struct TokenResponse {
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
    }

    let client = reqwest::Client::new();
    let response = client
        .post("https://oauth2.googleapis.com/token")
        .form(&TokenRequest {
            code,
            client_id: &config.client_id,
            client_secret: &config.client_secret,
            redirect_uri: &config.redirect_uri,
            grant_type: "authorization_code",
        })
        .send()
        .await
        .context("Failed to reach Google token endpoint")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        bail!("Token exchange failed ({}): {}", status, body);
    }

    let tokens: TokenResponse = response
        .json()
        .await
        .context("Invalid token response from Google")?;

    let refresh_token = tokens
        .refresh_token
        .context("Google did not return a refresh token")?;

    Ok(OAuthTokens {
        access_token: tokens.access_token,
        refresh_token,
        expires_at: Utc::now() + chrono::Duration::seconds(tokens.expires_in),
    })
}

/// Client for interacting with one mailbox through the Gmail API.
pub struct MailboxClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl MailboxClient {
    /// Build a client from a stored mailbox row, decrypting its token pair
    /// just before use. Both tokens must be present.
    pub async fn from_mailbox(
        config: &GoogleConfig,
        cipher: &TokenCipher,
        mailbox: &MailboxRow,
    ) -> Result<Self> {
        let (Some(access_enc), Some(refresh_enc)) = (
            mailbox.oauth_access_token.as_deref(),
            mailbox.oauth_refresh_token.as_deref(),
        ) else {
            bail!("Mailbox missing OAuth tokens: {}", mailbox.email_address);
        };

        let access_token = cipher.decrypt(access_enc)?;
        let refresh_token = cipher.decrypt(refresh_enc)?;
        Self::from_tokens(config, &access_token, &refresh_token).await
    }

    /// Build a client from a plain token pair. The underlying authenticator
    /// refreshes the access token transparently when it expires.
    pub async fn from_tokens(
        config: &GoogleConfig,
        _access_token: &str,
        refresh_token: &str,
    ) -> Result<Self> {
        // Use the yup_oauth2 re-exported by google_gmail1 to avoid version mismatch
        let secret = google_gmail1::yup_oauth2::authorized_user::AuthorizedUserSecret {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: refresh_token.to_string(),
            key_type: "authorized_user".to_string(),
        };

        let auth = google_gmail1::yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .context("Failed to build authenticator from refresh token")?;

        let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = Gmail::new(client, auth);

        Ok(Self { hub })
    }

    /// Email address of the authenticated profile.
    pub async fn profile_email(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile("me")
            .doit()
            .await
            .context("Failed to get profile")?;

        profile
            .email_address
            .context("No email address in profile")
    }

    /// Register push notifications for the inbox. The subscription expires
    /// server-side; the expiry is surfaced so it can be persisted and
    /// monitored, renewal happens out-of-band.
    pub async fn watch_inbox(&self, topic_name: &str) -> Result<WatchHandle> {
        let request = WatchRequest {
            topic_name: Some(topic_name.to_string()),
            label_ids: Some(vec!["INBOX".to_string()]),
            label_filter_behavior: Some("INCLUDE".to_string()),
            ..Default::default()
        };

        let (_, response) = self
            .hub
            .users()
            .watch(request, "me")
            .doit()
            .await
            .context("Failed to register inbox watch")?;

        Ok(WatchHandle {
            history_id: response.history_id.map(|h| h.to_string()),
            expires_at: response.expiration.and_then(expiry_from_millis),
        })
    }

    /// Unregister push notifications for this mailbox.
    pub async fn stop_watch(&self) -> Result<()> {
        self.hub
            .users()
            .stop("me")
            .doit()
            .await
            .context("Failed to stop inbox watch")?;

        Ok(())
    }

    /// List ids of the most recent inbox messages.
    pub async fn list_recent(&self, max_results: u32) -> Result<Vec<MessageRef>> {
        let (_, response) = self
            .hub
            .users()
            .messages_list("me")
            .add_label_ids("INBOX")
            .max_results(max_results)
            .doit()
            .await
            .context("Failed to list messages")?;

        let refs = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                let id = m.id?;
                let thread_id = m.thread_id.unwrap_or_default();
                Some(MessageRef { id, thread_id })
            })
            .collect();

        Ok(refs)
    }

    /// Fetch one full message.
    pub async fn get_message(&self, message_id: &str) -> Result<Message> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", message_id)
            .format("full")
            .doit()
            .await
            .with_context(|| format!("Failed to get message {}", message_id))?;

        Ok(message)
    }

    /// Diff of "message added" events since a history cursor. A cursor the
    /// provider can no longer resolve yields `CursorExpired`.
    pub async fn history_since(&self, cursor: &str) -> Result<HistoryDiff> {
        let start: u64 = cursor
            .parse()
            .with_context(|| format!("Invalid history cursor: {}", cursor))?;

        let result = self
            .hub
            .users()
            .history_list("me")
            .start_history_id(start)
            .add_history_types("messageAdded")
            .doit()
            .await;

        let response = match result {
            Ok((_, response)) => response,
            Err(e) if is_history_expired(&e) => return Ok(HistoryDiff::CursorExpired),
            Err(e) => return Err(e).context("Failed to list history"),
        };

        let mut added = Vec::new();
        let mut seen_ids = HashSet::new();

        for item in response.history.unwrap_or_default() {
            for message_added in item.messages_added.unwrap_or_default() {
                let Some(message) = message_added.message else {
                    continue;
                };
                let Some(id) = message.id else {
                    continue;
                };
                if seen_ids.insert(id.clone()) {
                    added.push(AddedMessage {
                        id,
                        thread_id: message.thread_id.unwrap_or_default(),
                        label_ids: message.label_ids.unwrap_or_default(),
                    });
                }
            }
        }

        Ok(HistoryDiff::Changes(added))
    }
}

/// The provider answers 404 when the start cursor is older than its
/// retention window.
fn is_history_expired(error: &google_gmail1::Error) -> bool {
    match error {
        google_gmail1::Error::BadRequest(value) => value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_i64())
            == Some(404),
        google_gmail1::Error::Failure(response) => response.status().as_u16() == 404,
        _ => false,
    }
}

fn expiry_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GoogleConfig {
        GoogleConfig {
            client_id: "client-id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/api/mailboxes/oauth/callback".to_string(),
            pubsub_project_id: "proj".to_string(),
            pubsub_topic: "gmail-notifications".to_string(),
        }
    }

    #[test]
    fn auth_url_encodes_parameters() {
        let url = auth_url(&test_config(), "5f9f1c2e-0000-0000-0000-000000000000");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fapi%2Fmailboxes%2Foauth%2Fcallback"
        ));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("state=5f9f1c2e-0000-0000-0000-000000000000"));
    }

    #[test]
    fn expired_cursor_detected_from_error_body() {
        let error = google_gmail1::Error::BadRequest(serde_json::json!({
            "error": { "code": 404, "message": "Requested entity was not found." }
        }));
        assert!(is_history_expired(&error));

        let other = google_gmail1::Error::BadRequest(serde_json::json!({
            "error": { "code": 403 }
        }));
        assert!(!is_history_expired(&other));
    }

    #[test]
    fn watch_expiry_converts_from_millis() {
        let expiry = expiry_from_millis(1_752_000_000_000).unwrap();
        assert_eq!(expiry.timestamp_millis(), 1_752_000_000_000);
        assert!(expiry_from_millis(i64::MAX).is_none());
    }
}
