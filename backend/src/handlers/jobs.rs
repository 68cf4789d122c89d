//! Background job audit trail (read-only).

use axum::{extract::State, Json};
use shared_types::JobLogResponse;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ApiResult;
use crate::AppState;

const JOB_LOG_PAGE: i64 = 100;

pub async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<JobLogResponse>>> {
    let mut conn = state.pool.get().await?;
    let rows = db::job_logs::list_recent(&mut conn, JOB_LOG_PAGE).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
