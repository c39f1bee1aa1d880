use axum::{Json, extract::State, http::StatusCode};
use axum_extra::extract::WithRejection;

use crate::authz::{Ability, Resource};
use crate::db::{DbOffice, DbRank};
use crate::domain::validation::LookupInput;
use crate::error::CredtrackError;
use crate::server::extract::ApiJson;
use crate::server::middleware::auth::Authenticated;
use crate::server::router::AppState;

/// GET /api/ranks
pub async fn ranks(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<DbRank>>, CredtrackError> {
    principal.authorize(Ability::ViewAny, Resource::Rank)?;
    Ok(Json(state.directory.ranks().await?))
}

/// POST /api/ranks
pub async fn store_rank(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    WithRejection(Json(input), _): ApiJson<LookupInput>,
) -> Result<(StatusCode, Json<DbRank>), CredtrackError> {
    principal.authorize(Ability::Create, Resource::Rank)?;
    let rank = state.directory.create_rank(input).await?;
    Ok((StatusCode::CREATED, Json(rank)))
}

/// GET /api/offices
pub async fn offices(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<DbOffice>>, CredtrackError> {
    principal.authorize(Ability::ViewAny, Resource::Office)?;
    Ok(Json(state.directory.offices().await?))
}

/// POST /api/offices
pub async fn store_office(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    WithRejection(Json(input), _): ApiJson<LookupInput>,
) -> Result<(StatusCode, Json<DbOffice>), CredtrackError> {
    principal.authorize(Ability::Create, Resource::Office)?;
    let office = state.directory.create_office(input).await?;
    Ok((StatusCode::CREATED, Json(office)))
}
