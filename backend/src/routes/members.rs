//! Member directory routes

use crate::error::ApiResult;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use rolegate_shared::{ApiMessage, MemberFilters, MembersPage};

pub fn member_routes() -> Router<AppState> {
    Router::new().route("/members", get(list_members))
}

/// List the members of a role
///
/// GET /api/v1/members?role=user&page=1&limit=10
async fn list_members(
    State(state): State<AppState>,
    Query(filters): Query<MemberFilters>,
) -> ApiResult<Json<ApiMessage<MembersPage>>> {
    let page = state.members.list_members(filters).await?;
    Ok(Json(ApiMessage::with_data("get members successfully", page)))
}
