use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use driveverse_types::api::{ProfileResponse, UserStatusResponse};
use driveverse_types::models::{Role, UserStatus};

use crate::error::{ApiError, ApiResult};
use crate::messages::parse_id;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// GET /api/users/profile
pub async fn my_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    profile(&state, user.id.to_string()).await
}

/// GET /api/users/profile/{id}: public card shown in chat headers and listings.
pub async fn public_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id, "Invalid user ID")?;
    profile(&state, id.to_string()).await
}

/// GET /api/users/wishlist: saved listing ids. Listings themselves live elsewhere.
pub async fn my_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let uid = user.id.to_string();
    let listing_ids = state.run_db(move |db| db.get_wishlist(&uid)).await?;
    Ok(Json(listing_ids))
}

async fn profile(state: &AppState, id: String) -> ApiResult<Json<ProfileResponse>> {
    let row = state
        .run_db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(ProfileResponse {
        name: row.name,
        avatar: row.avatar,
        location: row.place,
    }))
}

/// PATCH /api/users/admin/status/{id}: toggle active/blocked. A block is
/// pushed to the user's open sessions so they are logged out immediately.
pub async fn toggle_user_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(admin): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    if !admin.is_admin() {
        return Err(ApiError::Forbidden("Admin access only".into()));
    }
    let target_id = parse_id(&id, "Invalid user ID")?;

    let uid = target_id.to_string();
    let row = state
        .run_db(move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let role: Role = row
        .role
        .parse()
        .map_err(|e| ApiError::Internal(format!("user {}: {}", row.id, e)))?;
    if role == Role::Admin {
        return Err(ApiError::Forbidden("Cannot block admin account".into()));
    }

    let current: UserStatus = row
        .status
        .parse()
        .map_err(|e| ApiError::Internal(format!("user {}: {}", row.id, e)))?;
    let next = current.toggled();

    let uid = target_id.to_string();
    state
        .run_db(move |db| db.set_user_status(&uid, next.as_str()))
        .await?;
    info!("Admin {} set user {} to {}", admin.id, target_id, next);

    if next == UserStatus::Blocked {
        state.dispatcher.relay_blocked(target_id).await;
    }

    let verb = match next {
        UserStatus::Blocked => "blocked",
        UserStatus::Active => "unblocked",
    };
    Ok(Json(UserStatusResponse {
        message: format!("User {} successfully", verb),
        status: next,
    }))
}
