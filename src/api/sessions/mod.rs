use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{owned_session, CurrentCandidate};
use crate::core::state::AppState;
use crate::schemas::session::{
    BeginSessionResponse, CursorRequest, ExamPath, ResultResponse, SelectAnswerRequest,
    SelectAnswerResponse, SessionResponse,
};
use crate::services::session_controller::PresentedQuestion;
use crate::services::session_launch;


pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/exams/:exam_id/sessions", post(begin_session))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/question", get(current_question))
        .route("/sessions/:session_id/cursor", put(navigate))
        .route("/sessions/:session_id/answers", put(select_answer))
        .route("/sessions/:session_id/submit", post(submit))
}

pub(crate) async fn begin_session(
    State(state): State<AppState>,
    Path(path): Path<ExamPath>,
    candidate: CurrentCandidate,
) -> Result<(StatusCode, Json<BeginSessionResponse>), ApiError> {
    path.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let admission = session_launch::begin_or_resume(
        state.exam_source(),
        state.sessions(),
        state.session_env(),
        &path.exam_id,
        &candidate.0,
    )
    .await?;

    let resumed = admission.resumed();
    let status = if resumed { StatusCode::OK } else { StatusCode::CREATED };
    let session = SessionResponse::from(admission.handle().view());
    Ok((status, Json(BeginSessionResponse { resumed, session })))
}

pub(crate) async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    candidate: CurrentCandidate,
) -> Result<Json<SessionResponse>, ApiError> {
    let handle = owned_session(&state, &session_id, &candidate).await?;
    Ok(Json(handle.view().into()))
}

pub(crate) async fn current_question(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    candidate: CurrentCandidate,
) -> Result<Json<PresentedQuestion>, ApiError> {
    let handle = owned_session(&state, &session_id, &candidate).await?;
    Ok(Json(handle.current_question().await?))
}

pub(crate) async fn navigate(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    candidate: CurrentCandidate,
    Json(payload): Json<CursorRequest>,
) -> Result<Json<PresentedQuestion>, ApiError> {
    let handle = owned_session(&state, &session_id, &candidate).await?;
    Ok(Json(handle.navigate(payload.movement).await?))
}

pub(crate) async fn select_answer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    candidate: CurrentCandidate,
    Json(payload): Json<SelectAnswerRequest>,
) -> Result<Json<SelectAnswerResponse>, ApiError> {
    let handle = owned_session(&state, &session_id, &candidate).await?;
    let previous = handle.select(payload.position, payload.option_position).await?;

    Ok(Json(SelectAnswerResponse {
        position: payload.position,
        option_position: payload.option_position,
        previous_option_position: previous,
    }))
}

pub(crate) async fn submit(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    candidate: CurrentCandidate,
) -> Result<Json<ResultResponse>, ApiError> {
    let handle = owned_session(&state, &session_id, &candidate).await?;
    let result = handle.submit().await?;
    Ok(Json(result.into()))
}
