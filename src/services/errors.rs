use thiserror::Error;

use crate::services::session_controller::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum EngineError {
    #[error("position {position} is outside the {count} presented questions")]
    InvalidPosition { position: usize, count: usize },
    #[error("option {option_position} is outside the {count} options of position {position}")]
    InvalidOption { position: usize, option_position: usize, count: usize },
    #[error("exam has no questions to present")]
    EmptyExam,
    #[error("question {0} is not in the question bank")]
    UnknownQuestion(String),
    #[error("question {id} is malformed: {reason}")]
    InvalidQuestion { id: String, reason: String },
    #[error("exam definition {id} is malformed: {reason}")]
    InvalidExamDefinition { id: String, reason: String },
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error("exam catalog unavailable: {0}")]
    SourceUnavailable(String),
    #[error("session is {0}, not active")]
    SessionNotActive(SessionState),
    #[error("session is no longer running")]
    SessionUnavailable,
    #[error("result append failed: {0}")]
    ResultPersistenceFailure(String),
    #[error(
        "your result could not be saved after {attempts} attempts, contact an administrator"
    )]
    ResultPersistenceExhausted { attempts: u32 },
}
