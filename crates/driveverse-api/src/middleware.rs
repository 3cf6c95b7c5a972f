use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::warn;
use uuid::Uuid;

use driveverse_types::api::Claims;
use driveverse_types::models::{Role, UserStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Identity of the caller, resolved from the token and the users table.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Mint a token in the format this server accepts.
pub fn issue_token(secret: &str, user_id: Uuid, role: Role, ttl: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        role,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> ApiResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("Invalid token".into()))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Load the user behind verified claims. Unknown users are unauthorized,
/// blocked users are refused.
pub async fn resolve_user(state: &AppState, claims: &Claims) -> ApiResult<AuthUser> {
    let uid = claims.sub.to_string();
    let row = state
        .run_db(move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    let status: UserStatus = row
        .status
        .parse()
        .map_err(|e| ApiError::Internal(format!("user {}: {}", row.id, e)))?;
    if status == UserStatus::Blocked {
        warn!("Blocked user {} rejected", row.id);
        return Err(ApiError::AccountBlocked);
    }

    let role: Role = row
        .role
        .parse()
        .map_err(|e| ApiError::Internal(format!("user {}: {}", row.id, e)))?;

    Ok(AuthUser { id: claims.sub, role })
}

/// Extract and validate the JWT from the Authorization header, then attach
/// the resolved [`AuthUser`] to the request.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> ApiResult<Response> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("No token provided".into()))?;

    let claims = decode_token(&state.config.jwt_secret, token)?;
    let user = resolve_user(&state, &claims).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
