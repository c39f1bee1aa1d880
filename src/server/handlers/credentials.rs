use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::authz::{Ability, Resource};
use crate::db::{CredentialFilter, CredentialView, DbActivity, Trashed};
use crate::domain::validation::CredentialInput;
use crate::domain::{CredentialStatus, ValidationErrors};
use crate::error::CredtrackError;
use crate::server::extract::ApiJson;
use crate::server::middleware::auth::Authenticated;
use crate::server::router::AppState;
use crate::service::today;

#[derive(Debug, Default, Deserialize)]
pub struct CredentialQuery {
    #[serde(default)]
    pub trashed: Trashed,
    pub user_id: Option<i64>,
    pub status: Option<String>,
}

/// GET /api/credentials
pub async fn index(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<CredentialQuery>,
) -> Result<Json<Vec<CredentialView>>, CredtrackError> {
    principal.authorize(Ability::ViewAny, Resource::Credential)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<CredentialStatus>)
        .transpose()
        .map_err(|e| ValidationErrors::single("status", e))?;
    let filter = CredentialFilter {
        trashed: query.trashed,
        user_id: query.user_id,
    };
    let views = state.credentials.list(filter, status, today()).await?;
    Ok(Json(views))
}

/// POST /api/credentials
pub async fn store(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    WithRejection(Json(input), _): ApiJson<CredentialInput>,
) -> Result<(StatusCode, Json<CredentialView>), CredtrackError> {
    principal.authorize(Ability::Create, Resource::Credential)?;
    let view = state
        .credentials
        .create(input, Some(principal.user_id), today())
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/credentials/{id}
pub async fn show(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<CredentialView>, CredtrackError> {
    principal.authorize(Ability::View, Resource::Credential)?;
    Ok(Json(state.credentials.get(id, today()).await?))
}

/// PUT /api/credentials/{id}
pub async fn update(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
    WithRejection(Json(input), _): ApiJson<CredentialInput>,
) -> Result<Json<CredentialView>, CredtrackError> {
    principal.authorize(Ability::Update, Resource::Credential)?;
    let view = state
        .credentials
        .update(id, input, Some(principal.user_id), today())
        .await?;
    Ok(Json(view))
}

/// DELETE /api/credentials/{id}
pub async fn destroy(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, CredtrackError> {
    principal.authorize(Ability::Delete, Resource::Credential)?;
    state.credentials.delete(id, Some(principal.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/credentials/{id}/restore
pub async fn restore(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<CredentialView>, CredtrackError> {
    principal.authorize(Ability::Restore, Resource::Credential)?;
    let view = state
        .credentials
        .restore(id, Some(principal.user_id), today())
        .await?;
    Ok(Json(view))
}

/// DELETE /api/credentials/{id}/force
pub async fn force_destroy(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, CredtrackError> {
    principal.authorize(Ability::ForceDelete, Resource::Credential)?;
    state
        .credentials
        .force_delete(id, Some(principal.user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/credentials/{id}/activity
pub async fn activity(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DbActivity>>, CredtrackError> {
    principal.authorize(Ability::ViewAny, Resource::Activity)?;
    Ok(Json(state.credentials.activity(id).await?))
}

/// GET /api/activity
pub async fn all_activity(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<DbActivity>>, CredtrackError> {
    principal.authorize(Ability::ViewAny, Resource::Activity)?;
    Ok(Json(state.credentials.all_activity().await?))
}
