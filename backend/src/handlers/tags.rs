//! Tag taxonomy listing (static reference data).

use axum::{
    extract::{Path, State},
    Json,
};
use shared_types::TagResponse;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ApiResult;
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<TagResponse>>> {
    let mut conn = state.pool.get().await?;
    let rows = db::tags::list_all(&mut conn).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn by_category(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(category): Path<String>,
) -> ApiResult<Json<Vec<TagResponse>>> {
    let mut conn = state.pool.get().await?;
    let rows = db::tags::list_by_category(&mut conn, &category).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
