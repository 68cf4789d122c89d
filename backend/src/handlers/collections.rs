//! User-defined collections and their swipe membership.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared_types::{AddSwipeToCollectionRequest, CollectionResponse, CreateCollectionRequest, OkResponse};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::CollectionRow;
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<CollectionResponse>>> {
    let mut conn = state.pool.get().await?;
    let rows = db::collections::list_by_user(&mut conn, user.id).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateCollectionRequest>,
) -> ApiResult<Json<CollectionResponse>> {
    let mut conn = state.pool.get().await?;
    let row = db::collections::create(
        &mut conn,
        user.id,
        &payload.name,
        payload.description.as_deref(),
    )
    .await?;

    Ok(Json(row.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    let collection = owned_collection(&mut conn, user.id, id).await?;

    db::collections::delete(&mut conn, collection.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_swipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddSwipeToCollectionRequest>,
) -> ApiResult<Json<OkResponse>> {
    let mut conn = state.pool.get().await?;
    let collection = owned_collection(&mut conn, user.id, id).await?;

    // The swipe must belong to the caller too
    let swipe = db::swipes::get_by_id(&mut conn, payload.swipe_id)
        .await?
        .filter(|s| s.user_id == user.id)
        .ok_or_else(|| ApiError::not_found("Swipe"))?;

    db::collections::add_swipe(&mut conn, collection.id, swipe.id).await?;
    Ok(Json(OkResponse { success: true }))
}

pub async fn remove_swipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, swipe_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<OkResponse>> {
    let mut conn = state.pool.get().await?;
    let collection = owned_collection(&mut conn, user.id, id).await?;

    db::collections::remove_swipe(&mut conn, collection.id, swipe_id).await?;
    Ok(Json(OkResponse { success: true }))
}

/// A collection someone else owns behaves as if it does not exist.
async fn owned_collection(
    conn: &mut diesel_async::AsyncPgConnection,
    user_id: Uuid,
    collection_id: Uuid,
) -> Result<CollectionRow, ApiError> {
    db::collections::get_by_id(conn, collection_id)
        .await?
        .filter(|c| c.user_id == user_id)
        .ok_or_else(|| ApiError::not_found("Collection"))
}
