use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::tasks::session_runner::SessionHandle;

/// Identity of the authenticated candidate: the token's `sub`, verbatim.
pub(crate) struct CurrentCandidate(pub(crate) String);

#[async_trait]
impl FromRequestParts<AppState> for CurrentCandidate {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        Ok(CurrentCandidate(claims.sub))
    }
}

/// Looks up a session and checks that `candidate` owns it.
pub(crate) async fn owned_session(
    state: &AppState,
    session_id: &str,
    candidate: &CurrentCandidate,
) -> Result<SessionHandle, ApiError> {
    let handle = state
        .sessions()
        .get(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    if handle.candidate_identity() != candidate.0 {
        tracing::warn!(session_id, "Rejected access to another candidate's session");
        return Err(ApiError::Forbidden("Session belongs to another candidate"));
    }

    Ok(handle)
}
