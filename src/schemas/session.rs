use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::TerminationKind;
use crate::services::answer_tracker::{AnswerSnapshot, CursorMove};
use crate::services::randomization::EngineWarning;
use crate::services::result_store::ExamResult;
use crate::services::session_controller::{SessionState, SessionView};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamPath {
    #[validate(length(min = 1, max = 128, message = "exam_id must be 1-128 characters"))]
    pub(crate) exam_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectAnswerRequest {
    pub(crate) position: usize,
    #[serde(alias = "optionPosition")]
    pub(crate) option_position: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct SelectAnswerResponse {
    pub(crate) position: usize,
    pub(crate) option_position: usize,
    pub(crate) previous_option_position: Option<usize>,
}

/// `{"movement": "next"}`, `{"movement": "previous"}` or `{"movement": {"to": 3}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct CursorRequest {
    pub(crate) movement: CursorMove,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) correct_count: u32,
    pub(crate) total_questions: u32,
    pub(crate) percent_score: u32,
    pub(crate) submitted_at_epoch_seconds: i64,
    pub(crate) time_taken_seconds: u32,
    pub(crate) termination: TerminationKind,
    pub(crate) raw_answers: AnswerSnapshot,
}

impl From<ExamResult> for ResultResponse {
    fn from(result: ExamResult) -> Self {
        Self {
            session_id: result.session_id,
            exam_id: result.exam_id,
            correct_count: result.correct_count,
            total_questions: result.total_questions,
            percent_score: result.percent_score,
            submitted_at_epoch_seconds: result.submitted_at_epoch_seconds,
            time_taken_seconds: result.time_taken_seconds,
            termination: result.termination,
            raw_answers: result.raw_answers,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) state: SessionState,
    pub(crate) remaining_seconds: u32,
    pub(crate) answered_count: usize,
    pub(crate) question_count: usize,
    pub(crate) cursor: usize,
    pub(crate) started_at_epoch_seconds: Option<i64>,
    pub(crate) warnings: Vec<String>,
    pub(crate) result: Option<ResultResponse>,
    /// Set when the session ended without its result being saved.
    pub(crate) error: Option<String>,
}

impl From<SessionView> for SessionResponse {
    fn from(view: SessionView) -> Self {
        Self {
            session_id: view.session_id,
            exam_id: view.exam_id,
            state: view.state,
            remaining_seconds: view.remaining_seconds,
            answered_count: view.answered_count,
            question_count: view.question_count,
            cursor: view.cursor,
            started_at_epoch_seconds: view.started_at_epoch_seconds,
            warnings: view.warnings.iter().map(EngineWarning::to_string).collect(),
            result: view.result.map(ResultResponse::from),
            error: view.failure.map(|failure| failure.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BeginSessionResponse {
    pub(crate) resumed: bool,
    #[serde(flatten)]
    pub(crate) session: SessionResponse,
}
