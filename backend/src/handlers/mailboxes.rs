//! Mailbox management: OAuth connect flow, listing, disconnect, manual sync.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use serde::Deserialize;
use shared_types::{ConnectMailboxResponse, MailboxResponse, OkResponse};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::gmail::client::{self, MailboxClient};
use crate::jobs::sync::SyncJob;
use crate::jobs::JobKind;
use crate::models::MailboxRow;
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<MailboxResponse>>> {
    let mut conn = state.pool.get().await?;
    let rows = db::mailboxes::list_by_user(&mut conn, user.id).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Start the OAuth consent flow. The caller's id rides in the `state`
/// parameter so the callback can attribute the mailbox.
pub async fn connect(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<ConnectMailboxResponse>> {
    let auth_url = client::auth_url(&state.config.google, &user.id.to_string());

    Ok(Json(ConnectMailboxResponse { auth_url }))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: String,
    pub state: String,
}

/// OAuth callback: exchange the code, look up the profile, register the
/// inbox watch, store the mailbox with encrypted tokens, and kick off the
/// initial sync.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
) -> ApiResult<Redirect> {
    let user_id = Uuid::parse_str(&params.state)
        .map_err(|_| ApiError::bad_request("Invalid state parameter"))?;

    let tokens = client::exchange_code(&state.config.google, &params.code).await?;

    let gmail =
        MailboxClient::from_tokens(&state.config.google, &tokens.access_token, &tokens.refresh_token)
            .await?;
    let email_address = gmail.profile_email().await?;
    let watch = gmail.watch_inbox(&state.config.google.topic_name()).await?;

    let refresh_token_enc = state.cipher.encrypt(&tokens.refresh_token)?;
    let access_token_enc = state.cipher.encrypt(&tokens.access_token)?;

    let mut conn = state.pool.get().await?;
    let mailbox = db::mailboxes::upsert_connection(
        &mut conn,
        user_id,
        &email_address,
        &refresh_token_enc,
        &access_token_enc,
        tokens.expires_at,
        watch.history_id.as_deref(),
        watch.expires_at,
    )
    .await?;

    tracing::info!("Connected mailbox {} for user {}", email_address, user_id);

    state
        .queue
        .enqueue(
            JobKind::InitialSync,
            &SyncJob {
                mailbox_id: mailbox.id,
                user_id,
                max_results: None,
            },
        )
        .await?;

    Ok(Redirect::to("/"))
}

pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    let mailbox = owned_mailbox(&mut conn, user.id, id).await?;

    // Stop the push subscription before dropping credentials. Failures
    // here must not block disconnect.
    if mailbox.oauth_access_token.is_some() && mailbox.oauth_refresh_token.is_some() {
        match MailboxClient::from_mailbox(&state.config.google, &state.cipher, &mailbox).await {
            Ok(client) => {
                if let Err(e) = client.stop_watch().await {
                    tracing::warn!(
                        "Failed to stop watch for {}: {:#}",
                        mailbox.email_address,
                        e
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to build Gmail client for {}: {:#}",
                    mailbox.email_address,
                    e
                );
            }
        }
    }

    db::mailboxes::delete(&mut conn, mailbox.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    let mut conn = state.pool.get().await?;
    let mailbox = owned_mailbox(&mut conn, user.id, id).await?;

    state
        .queue
        .enqueue(
            JobKind::ManualSync,
            &SyncJob {
                mailbox_id: mailbox.id,
                user_id: user.id,
                max_results: None,
            },
        )
        .await?;

    Ok(Json(OkResponse { success: true }))
}

/// A mailbox someone else owns behaves as if it does not exist.
async fn owned_mailbox(
    conn: &mut diesel_async::AsyncPgConnection,
    user_id: Uuid,
    mailbox_id: Uuid,
) -> Result<MailboxRow, ApiError> {
    db::mailboxes::get_by_id(conn, mailbox_id)
        .await?
        .filter(|m| m.user_id == user_id)
        .ok_or_else(|| ApiError::not_found("Mailbox"))
}
