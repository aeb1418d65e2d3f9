use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct QuestionRow {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) options: Json<Vec<String>>,
    pub(crate) correct_option_index: i32,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExamDefinitionRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) duration_seconds: i32,
    pub(crate) question_ids: Json<Vec<String>>,
    pub(crate) presented_question_count: i32,
}

/// Stored result as read back for re-grading.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExamResultRow {
    pub(crate) session_id: String,
    pub(crate) candidate_identity: String,
    pub(crate) correct_count: i32,
    pub(crate) percent_score: i32,
    pub(crate) raw_answers: Json<serde_json::Value>,
    pub(crate) presentation: Json<serde_json::Value>,
}
