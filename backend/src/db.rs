use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use uuid::Uuid;

use crate::models::{
    CollectionRow, JobLogRow, MailboxRow, NewSwipe, QueueJobRow, SwipeRow, TagRow, UserRow,
};

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    // Parse the connection string and connect with TLS
    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    // Spawn the connection task
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    // Build the async connection from the tokio-postgres client
    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

// User database operations
#[allow(dead_code)]
pub mod users {
    use super::*;

    pub async fn get_by_id(conn: &mut AsyncPgConnection, user_id: Uuid) -> anyhow::Result<UserRow> {
        use crate::schema::users::dsl::*;

        let user = users.filter(id.eq(user_id)).first::<UserRow>(conn).await?;

        Ok(user)
    }

    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        email_val: Option<&str>,
        name_val: Option<&str>,
    ) -> anyhow::Result<UserRow> {
        use crate::schema::users::dsl::*;

        let now = Utc::now();
        let user = diesel::insert_into(users)
            .values((
                id.eq(user_id),
                email.eq(email_val),
                name.eq(name_val),
                role.eq("user"),
                created_at.eq(now),
                last_signed_in.eq(now),
            ))
            .on_conflict(id)
            .do_update()
            .set(last_signed_in.eq(now))
            .get_result::<UserRow>(conn)
            .await?;

        Ok(user)
    }
}

// Mailbox database operations
pub mod mailboxes {
    use super::*;

    pub async fn list_by_user(
        conn: &mut AsyncPgConnection,
        owner_id: Uuid,
    ) -> anyhow::Result<Vec<MailboxRow>> {
        use crate::schema::mailboxes::dsl::*;

        let rows = mailboxes
            .filter(user_id.eq(owner_id))
            .order_by(created_at.desc())
            .load::<MailboxRow>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        mailbox_id: Uuid,
    ) -> anyhow::Result<Option<MailboxRow>> {
        use crate::schema::mailboxes::dsl::*;

        let row = mailboxes
            .filter(id.eq(mailbox_id))
            .first::<MailboxRow>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    pub async fn get_by_email(
        conn: &mut AsyncPgConnection,
        email: &str,
    ) -> anyhow::Result<Option<MailboxRow>> {
        use crate::schema::mailboxes::dsl::*;

        let row = mailboxes
            .filter(email_address.eq(email))
            .first::<MailboxRow>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    /// Create a mailbox on first connect, or refresh tokens, cursor and
    /// watch expiry when the same user reconnects the same address.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_connection(
        conn: &mut AsyncPgConnection,
        owner_id: Uuid,
        email: &str,
        refresh_token_enc: &str,
        access_token_enc: &str,
        expires_at: DateTime<Utc>,
        history_id: Option<&str>,
        watch_expiry: Option<DateTime<Utc>>,
    ) -> anyhow::Result<MailboxRow> {
        use crate::schema::mailboxes::dsl::*;

        let now = Utc::now();
        let existing = mailboxes
            .filter(user_id.eq(owner_id).and(email_address.eq(email)))
            .first::<MailboxRow>(conn)
            .await
            .optional()?;

        let row = match existing {
            Some(mailbox) => {
                diesel::update(mailboxes.filter(id.eq(mailbox.id)))
                    .set((
                        oauth_refresh_token.eq(Some(refresh_token_enc)),
                        oauth_access_token.eq(Some(access_token_enc)),
                        token_expires_at.eq(Some(expires_at)),
                        gmail_history_id.eq(history_id),
                        watch_expires_at.eq(watch_expiry),
                        is_active.eq(true),
                        last_sync_at.eq(Some(now)),
                    ))
                    .get_result::<MailboxRow>(conn)
                    .await?
            }
            None => {
                diesel::insert_into(mailboxes)
                    .values((
                        id.eq(Uuid::new_v4()),
                        user_id.eq(owner_id),
                        email_address.eq(email),
                        oauth_refresh_token.eq(Some(refresh_token_enc)),
                        oauth_access_token.eq(Some(access_token_enc)),
                        token_expires_at.eq(Some(expires_at)),
                        gmail_history_id.eq(history_id),
                        watch_expires_at.eq(watch_expiry),
                        is_active.eq(true),
                        last_sync_at.eq(Some(now)),
                        created_at.eq(now),
                    ))
                    .get_result::<MailboxRow>(conn)
                    .await?
            }
        };

        Ok(row)
    }

    /// Advance the history cursor and sync timestamp. Called once per
    /// processed notification, after the per-message loop.
    pub async fn update_cursor(
        conn: &mut AsyncPgConnection,
        mailbox_id: Uuid,
        history_id: &str,
    ) -> anyhow::Result<()> {
        use crate::schema::mailboxes::dsl::*;

        diesel::update(mailboxes.filter(id.eq(mailbox_id)))
            .set((
                gmail_history_id.eq(Some(history_id)),
                last_sync_at.eq(Some(Utc::now())),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn touch_last_sync(
        conn: &mut AsyncPgConnection,
        mailbox_id: Uuid,
    ) -> anyhow::Result<()> {
        use crate::schema::mailboxes::dsl::*;

        diesel::update(mailboxes.filter(id.eq(mailbox_id)))
            .set(last_sync_at.eq(Some(Utc::now())))
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn delete(conn: &mut AsyncPgConnection, mailbox_id: Uuid) -> anyhow::Result<()> {
        use crate::schema::mailboxes::dsl::*;

        diesel::delete(mailboxes.filter(id.eq(mailbox_id)))
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Swipe database operations
pub mod swipes {
    use super::*;
    use shared_types::JsonWrapper;

    pub async fn create(conn: &mut AsyncPgConnection, swipe: NewSwipe) -> anyhow::Result<SwipeRow> {
        use crate::schema::swipes::dsl::*;

        let now = Utc::now();
        let row = diesel::insert_into(swipes)
            .values((
                &swipe,
                is_favorite.eq(false),
                created_at.eq(now),
                updated_at.eq(now),
            ))
            .get_result::<SwipeRow>(conn)
            .await?;

        Ok(row)
    }

    pub async fn list_by_user(
        conn: &mut AsyncPgConnection,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<SwipeRow>> {
        use crate::schema::swipes::dsl::*;

        let rows = swipes
            .filter(user_id.eq(owner_id))
            .order_by(received_date.desc())
            .limit(limit)
            .offset(offset)
            .load::<SwipeRow>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        swipe_id: Uuid,
    ) -> anyhow::Result<Option<SwipeRow>> {
        use crate::schema::swipes::dsl::*;

        let row = swipes
            .filter(id.eq(swipe_id))
            .first::<SwipeRow>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    /// Provider message ids already captured for a user. Bounded scan used
    /// by sync-time duplicate detection.
    pub async fn recent_message_ids(
        conn: &mut AsyncPgConnection,
        owner_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<String>> {
        use crate::schema::swipes::dsl::*;

        let ids = swipes
            .filter(user_id.eq(owner_id))
            .order_by(received_date.desc())
            .limit(limit)
            .select(gmail_message_id)
            .load::<String>(conn)
            .await?;

        Ok(ids)
    }

    pub async fn update_user_fields(
        conn: &mut AsyncPgConnection,
        swipe_id: Uuid,
        notes_val: Option<&str>,
        manual_tags_val: Option<Vec<String>>,
    ) -> anyhow::Result<SwipeRow> {
        use crate::schema::swipes::dsl::*;

        if let Some(n) = notes_val {
            diesel::update(swipes.filter(id.eq(swipe_id)))
                .set(notes.eq(Some(n)))
                .execute(conn)
                .await?;
        }
        if let Some(t) = manual_tags_val {
            diesel::update(swipes.filter(id.eq(swipe_id)))
                .set(manual_tags.eq(Some(JsonWrapper::new(t))))
                .execute(conn)
                .await?;
        }

        // Always update updated_at and return the result
        let row = diesel::update(swipes.filter(id.eq(swipe_id)))
            .set(updated_at.eq(Utc::now()))
            .get_result::<SwipeRow>(conn)
            .await?;

        Ok(row)
    }

    /// Flip the favorite flag and bump updated_at, returning the new state.
    pub async fn toggle_favorite(
        conn: &mut AsyncPgConnection,
        swipe_id: Uuid,
        current: bool,
    ) -> anyhow::Result<SwipeRow> {
        use crate::schema::swipes::dsl::*;

        let row = diesel::update(swipes.filter(id.eq(swipe_id)))
            .set((is_favorite.eq(!current), updated_at.eq(Utc::now())))
            .get_result::<SwipeRow>(conn)
            .await?;

        Ok(row)
    }

    pub async fn delete(conn: &mut AsyncPgConnection, swipe_id: Uuid) -> anyhow::Result<()> {
        use crate::schema::swipes::dsl::*;

        diesel::delete(swipes.filter(id.eq(swipe_id)))
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Tag database operations
pub mod tags {
    use super::*;

    pub async fn list_all(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<TagRow>> {
        use crate::schema::tags::dsl::*;

        let rows = tags
            .order_by((category.asc(), name.asc()))
            .load::<TagRow>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn list_by_category(
        conn: &mut AsyncPgConnection,
        category_val: &str,
    ) -> anyhow::Result<Vec<TagRow>> {
        use crate::schema::tags::dsl::*;

        let rows = tags
            .filter(category.eq(category_val))
            .order_by(name.asc())
            .load::<TagRow>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn get_by_name(
        conn: &mut AsyncPgConnection,
        category_val: &str,
        name_val: &str,
    ) -> anyhow::Result<Option<TagRow>> {
        use crate::schema::tags::dsl::*;

        let row = tags
            .filter(category.eq(category_val).and(name.eq(name_val)))
            .first::<TagRow>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    /// Seed one taxonomy entry, updating the description when it already
    /// exists. Relies on the unique (category, name) index.
    pub async fn upsert_seed(
        conn: &mut AsyncPgConnection,
        category_val: &str,
        name_val: &str,
        description_val: Option<&str>,
    ) -> anyhow::Result<()> {
        use crate::schema::tags::dsl::*;

        diesel::insert_into(tags)
            .values((
                id.eq(Uuid::new_v4()),
                category.eq(category_val),
                name.eq(name_val),
                description.eq(description_val),
                created_at.eq(Utc::now()),
            ))
            .on_conflict((category, name))
            .do_update()
            .set(description.eq(description_val))
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Swipe-tag link operations
pub mod swipe_tags {
    use super::*;
    use diesel::upsert::excluded;

    /// Link a tag to a swipe. At most one link per (swipe, tag) pair;
    /// re-linking overwrites the confidence score.
    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        swipe_id_val: Uuid,
        tag_id_val: Uuid,
        confidence: i32,
        ai_generated: bool,
    ) -> anyhow::Result<()> {
        use crate::schema::swipe_tags::dsl::*;

        diesel::insert_into(swipe_tags)
            .values((
                swipe_id.eq(swipe_id_val),
                tag_id.eq(tag_id_val),
                confidence_score.eq(confidence),
                is_ai_generated.eq(ai_generated),
            ))
            .on_conflict((swipe_id, tag_id))
            .do_update()
            .set(confidence_score.eq(excluded(confidence_score)))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Tags attached to one swipe, with link confidence and provenance.
    pub async fn list_for_swipe(
        conn: &mut AsyncPgConnection,
        swipe_id_val: Uuid,
    ) -> anyhow::Result<Vec<(TagRow, i32, bool)>> {
        use crate::schema::{swipe_tags, tags};

        let rows = swipe_tags::table
            .inner_join(tags::table)
            .filter(swipe_tags::swipe_id.eq(swipe_id_val))
            .select((
                TagRow::as_select(),
                swipe_tags::confidence_score,
                swipe_tags::is_ai_generated,
            ))
            .load::<(TagRow, i32, bool)>(conn)
            .await?;

        Ok(rows)
    }
}

// Collection database operations
pub mod collections {
    use super::*;

    pub async fn list_by_user(
        conn: &mut AsyncPgConnection,
        owner_id: Uuid,
    ) -> anyhow::Result<Vec<CollectionRow>> {
        use crate::schema::collections::dsl::*;

        let rows = collections
            .filter(user_id.eq(owner_id))
            .order_by(created_at.desc())
            .load::<CollectionRow>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        collection_id: Uuid,
    ) -> anyhow::Result<Option<CollectionRow>> {
        use crate::schema::collections::dsl::*;

        let row = collections
            .filter(id.eq(collection_id))
            .first::<CollectionRow>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    pub async fn create(
        conn: &mut AsyncPgConnection,
        owner_id: Uuid,
        name_val: &str,
        description_val: Option<&str>,
    ) -> anyhow::Result<CollectionRow> {
        use crate::schema::collections::dsl::*;

        let row = diesel::insert_into(collections)
            .values((
                id.eq(Uuid::new_v4()),
                user_id.eq(owner_id),
                name.eq(name_val),
                description.eq(description_val),
                is_public.eq(false),
                created_at.eq(Utc::now()),
            ))
            .get_result::<CollectionRow>(conn)
            .await?;

        Ok(row)
    }

    pub async fn delete(conn: &mut AsyncPgConnection, collection_id: Uuid) -> anyhow::Result<()> {
        use crate::schema::collections::dsl::*;

        diesel::delete(collections.filter(id.eq(collection_id)))
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn add_swipe(
        conn: &mut AsyncPgConnection,
        collection_id_val: Uuid,
        swipe_id_val: Uuid,
    ) -> anyhow::Result<()> {
        use crate::schema::collection_swipes::dsl::*;

        diesel::insert_into(collection_swipes)
            .values((
                collection_id.eq(collection_id_val),
                swipe_id.eq(swipe_id_val),
                added_at.eq(Utc::now()),
            ))
            .on_conflict((collection_id, swipe_id))
            .do_nothing()
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn remove_swipe(
        conn: &mut AsyncPgConnection,
        collection_id_val: Uuid,
        swipe_id_val: Uuid,
    ) -> anyhow::Result<()> {
        use crate::schema::collection_swipes::dsl::*;

        diesel::delete(
            collection_swipes.filter(
                collection_id
                    .eq(collection_id_val)
                    .and(swipe_id.eq(swipe_id_val)),
            ),
        )
        .execute(conn)
        .await?;

        Ok(())
    }
}

// Job log operations (append-only audit trail)
pub mod job_logs {
    use super::*;

    /// Open an audit record for a job that is about to run.
    pub async fn start(
        conn: &mut AsyncPgConnection,
        job_type_val: &str,
        payload_val: &str,
    ) -> anyhow::Result<Uuid> {
        use crate::schema::job_logs::dsl::*;

        let log_id = Uuid::new_v4();
        diesel::insert_into(job_logs)
            .values((
                id.eq(log_id),
                job_type.eq(job_type_val),
                status.eq("processing"),
                payload.eq(Some(payload_val)),
                created_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(log_id)
    }

    pub async fn mark_completed(conn: &mut AsyncPgConnection, log_id: Uuid) -> anyhow::Result<()> {
        use crate::schema::job_logs::dsl::*;

        diesel::update(job_logs.filter(id.eq(log_id)))
            .set((status.eq("completed"), completed_at.eq(Some(Utc::now()))))
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn mark_failed(
        conn: &mut AsyncPgConnection,
        log_id: Uuid,
        error_msg: &str,
    ) -> anyhow::Result<()> {
        use crate::schema::job_logs::dsl::*;

        diesel::update(job_logs.filter(id.eq(log_id)))
            .set((
                status.eq("failed"),
                error.eq(Some(error_msg)),
                completed_at.eq(Some(Utc::now())),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn list_recent(
        conn: &mut AsyncPgConnection,
        limit: i64,
    ) -> anyhow::Result<Vec<JobLogRow>> {
        use crate::schema::job_logs::dsl::*;

        let rows = job_logs
            .order_by(created_at.desc())
            .limit(limit)
            .load::<JobLogRow>(conn)
            .await?;

        Ok(rows)
    }
}

// Durable queue operations
pub mod queue {
    use super::*;

    pub async fn enqueue(
        conn: &mut AsyncPgConnection,
        queue_name: &str,
        kind_val: &str,
        payload_val: &str,
        max_attempts_val: i32,
    ) -> anyhow::Result<Uuid> {
        use crate::schema::queue_jobs::dsl::*;

        let now = Utc::now();
        let job_id = Uuid::new_v4();
        diesel::insert_into(queue_jobs)
            .values((
                id.eq(job_id),
                queue.eq(queue_name),
                kind.eq(kind_val),
                payload.eq(payload_val),
                status.eq("queued"),
                attempts.eq(0),
                max_attempts.eq(max_attempts_val),
                run_at.eq(now),
                created_at.eq(now),
                updated_at.eq(now),
            ))
            .execute(conn)
            .await?;

        Ok(job_id)
    }

    /// Claim the next due job on a queue. The claim is optimistic: the
    /// update only succeeds while the row is still queued, so two workers
    /// racing on the same row leave one of them empty-handed.
    pub async fn claim_due(
        conn: &mut AsyncPgConnection,
        queue_name: &str,
    ) -> anyhow::Result<Option<QueueJobRow>> {
        use crate::schema::queue_jobs::dsl::*;

        let candidate: Option<Uuid> = queue_jobs
            .filter(
                queue
                    .eq(queue_name)
                    .and(status.eq("queued"))
                    .and(run_at.le(Utc::now())),
            )
            .order_by(run_at.asc())
            .select(id)
            .first::<Uuid>(conn)
            .await
            .optional()?;

        let Some(job_id) = candidate else {
            return Ok(None);
        };

        let claimed = diesel::update(queue_jobs.filter(id.eq(job_id).and(status.eq("queued"))))
            .set((
                status.eq("running"),
                attempts.eq(attempts + 1),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<QueueJobRow>(conn)
            .await
            .optional()?;

        Ok(claimed)
    }

    pub async fn mark_completed(conn: &mut AsyncPgConnection, job_id: Uuid) -> anyhow::Result<()> {
        use crate::schema::queue_jobs::dsl::*;

        diesel::update(queue_jobs.filter(id.eq(job_id)))
            .set((status.eq("completed"), updated_at.eq(Utc::now())))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Put a failed job back on the queue for a later attempt.
    pub async fn schedule_retry(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
        error_msg: &str,
        next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        use crate::schema::queue_jobs::dsl::*;

        diesel::update(queue_jobs.filter(id.eq(job_id)))
            .set((
                status.eq("queued"),
                last_error.eq(Some(error_msg)),
                run_at.eq(next_run_at),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn mark_failed(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
        error_msg: &str,
    ) -> anyhow::Result<()> {
        use crate::schema::queue_jobs::dsl::*;

        diesel::update(queue_jobs.filter(id.eq(job_id)))
            .set((
                status.eq("failed"),
                last_error.eq(Some(error_msg)),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }
}
