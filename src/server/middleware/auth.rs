use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::Authorization;
use headers::authorization::Bearer;
use tracing::warn;

use crate::authz::Principal;
use crate::error::CredtrackError;
use crate::server::router::AppState;

/// The caller behind `Authorization: Bearer <user_id>|<secret>`.
/// Rejects with 401 when the header is missing or the token does not verify.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = CredtrackError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await;
        let Ok(TypedHeader(Authorization(bearer))) = bearer else {
            warn!(
                target: "security",
                method = %parts.method,
                path = %parts.uri.path(),
                "request without bearer token"
            );
            return Err(CredtrackError::Unauthorized);
        };
        let principal = state.users.authenticate(bearer.token()).await?;
        Ok(Self(principal))
    }
}
