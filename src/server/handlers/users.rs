use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::authz::policy::UserPolicy;
use crate::authz::{Ability, Principal, Resource};
use crate::db::{DbNotification, DbUser, Trashed};
use crate::domain::validation::UserInput;
use crate::error::CredtrackError;
use crate::server::extract::ApiJson;
use crate::server::middleware::auth::Authenticated;
use crate::server::router::AppState;
use crate::service::today;
use crate::service::users::{UserDetail, UserWithToken};

#[derive(Debug, Default, Deserialize)]
pub struct TrashedQuery {
    #[serde(default)]
    pub trashed: Trashed,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub user: UserInput,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncRolesRequest {
    pub roles: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub user_id: i64,
    pub roles: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user_id: i64,
    pub token: String,
}

/// GET /api/me
pub async fn me(Authenticated(principal): Authenticated) -> Json<Principal> {
    Json(principal)
}

/// GET /api/users
pub async fn index(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<TrashedQuery>,
) -> Result<Json<Vec<DbUser>>, CredtrackError> {
    principal.authorize(Ability::ViewAny, Resource::User)?;
    Ok(Json(state.users.list(query.trashed).await?))
}

/// POST /api/users
pub async fn store(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    WithRejection(Json(req), _): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserWithToken>), CredtrackError> {
    principal.authorize(Ability::Create, Resource::User)?;
    if !req.roles.is_empty() {
        principal.authorize(Ability::Update, Resource::Role)?;
    }
    let created = state.users.create(req.user, &req.roles).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/users/{id}
pub async fn show(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<UserDetail>, CredtrackError> {
    principal.authorize(Ability::View, Resource::User)?;
    Ok(Json(state.users.detail(id, today()).await?))
}

/// PUT /api/users/{id}
pub async fn update(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
    WithRejection(Json(input), _): ApiJson<UserInput>,
) -> Result<Json<DbUser>, CredtrackError> {
    principal.authorize(Ability::Update, Resource::User)?;
    Ok(Json(state.users.update(id, input).await?))
}

/// DELETE /api/users/{id}
pub async fn destroy(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, CredtrackError> {
    UserPolicy::authorize_delete(&principal, id, false)?;
    state.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/users/{id}/restore
pub async fn restore(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<DbUser>, CredtrackError> {
    principal.authorize(Ability::Restore, Resource::User)?;
    Ok(Json(state.users.restore(id).await?))
}

/// DELETE /api/users/{id}/force
pub async fn force_destroy(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, CredtrackError> {
    UserPolicy::authorize_delete(&principal, id, true)?;
    state.users.force_delete(id, Some(principal.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/users/{id}/token
pub async fn rotate_token(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<TokenResponse>, CredtrackError> {
    principal.authorize(Ability::Update, Resource::User)?;
    let user = state.users.get(id).await?;
    if user.is_trashed() {
        return Err(CredtrackError::not_found("user", id));
    }
    let issued = state.users.rotate_token(id).await?;
    Ok(Json(TokenResponse {
        user_id: id,
        token: issued.plain,
    }))
}

/// PUT /api/users/{id}/roles
pub async fn sync_roles(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
    WithRejection(Json(req), _): ApiJson<SyncRolesRequest>,
) -> Result<Json<RolesResponse>, CredtrackError> {
    principal.authorize(Ability::Update, Resource::Role)?;
    let roles = state.users.sync_roles(id, &req.roles).await?;
    Ok(Json(RolesResponse { user_id: id, roles }))
}

/// GET /api/users/{id}/notifications
pub async fn notifications(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DbNotification>>, CredtrackError> {
    if principal.user_id != id {
        principal.authorize(Ability::View, Resource::User)?;
    }
    Ok(Json(state.users.notifications(id).await?))
}
