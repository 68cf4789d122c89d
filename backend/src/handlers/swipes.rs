//! Swipe CRUD, favorites, and similarity search.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared_types::{
    FavoriteToggledResponse, SimilarQuery, SimilarSwipeResponse, SwipeDetailResponse,
    SwipeListQuery, SwipeResponse, SwipeTagEntry, UpdateSwipeRequest,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::SwipeRow;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const DEFAULT_SIMILAR_LIMIT: u64 = 10;

pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SwipeListQuery>,
) -> ApiResult<Json<Vec<SwipeResponse>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let mut conn = state.pool.get().await?;
    let rows = db::swipes::list_by_user(&mut conn, user.id, limit, offset).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SwipeDetailResponse>> {
    let mut conn = state.pool.get().await?;
    let swipe = owned_swipe(&mut conn, user.id, id).await?;

    let tags = db::swipe_tags::list_for_swipe(&mut conn, swipe.id)
        .await?
        .into_iter()
        .map(|(tag, confidence_score, is_ai_generated)| SwipeTagEntry {
            id: tag.id,
            category: tag.category,
            name: tag.name,
            description: tag.description,
            confidence_score,
            is_ai_generated,
        })
        .collect();

    Ok(Json(SwipeDetailResponse {
        swipe: swipe.into(),
        tags,
    }))
}

pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSwipeRequest>,
) -> ApiResult<Json<SwipeResponse>> {
    let mut conn = state.pool.get().await?;
    let swipe = owned_swipe(&mut conn, user.id, id).await?;

    let row = db::swipes::update_user_fields(
        &mut conn,
        swipe.id,
        payload.notes.as_deref(),
        payload.manual_tags,
    )
    .await?;

    Ok(Json(row.into()))
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FavoriteToggledResponse>> {
    let mut conn = state.pool.get().await?;
    let swipe = owned_swipe(&mut conn, user.id, id).await?;

    let row = db::swipes::toggle_favorite(&mut conn, swipe.id, swipe.is_favorite).await?;

    Ok(Json(FavoriteToggledResponse {
        success: true,
        is_favorite: row.is_favorite,
    }))
}

pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    let swipe = owned_swipe(&mut conn, user.id, id).await?;

    // Vector cleanup is best-effort; the row is deleted regardless.
    if let Some(vector_id) = swipe.embedding_vector_id {
        if let Err(e) = state.vector.delete(vector_id).await {
            tracing::warn!("Failed to delete vector {}: {:#}", vector_id, e);
        }
    }

    db::swipes::delete(&mut conn, swipe.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Embed the swipe's text on demand and query the vector index, scoped to
/// the caller. The swipe itself is excluded from the results.
pub async fn find_similar(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<SimilarQuery>,
) -> ApiResult<Json<Vec<SimilarSwipeResponse>>> {
    let limit = query.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);

    let mut conn = state.pool.get().await?;
    let swipe = owned_swipe(&mut conn, user.id, id).await?;

    let text = format!("{}\n\n{}", swipe.subject, swipe.plain_body);
    let embedding = state.ai.generate_embedding(&text).await?;

    let hits = state.vector.search(&embedding, user.id, limit).await?;

    let mut similar = Vec::new();
    for hit in hits {
        if hit.payload.swipe_id == swipe.id {
            continue;
        }
        if let Some(row) = db::swipes::get_by_id(&mut conn, hit.payload.swipe_id).await? {
            similar.push(SimilarSwipeResponse {
                swipe: row.into(),
                similarity_score: hit.score,
            });
        }
    }

    Ok(Json(similar))
}

/// A swipe someone else owns behaves as if it does not exist.
async fn owned_swipe(
    conn: &mut diesel_async::AsyncPgConnection,
    user_id: Uuid,
    swipe_id: Uuid,
) -> Result<SwipeRow, ApiError> {
    db::swipes::get_by_id(conn, swipe_id)
        .await?
        .filter(|s| s.user_id == user_id)
        .ok_or_else(|| ApiError::not_found("Swipe"))
}
