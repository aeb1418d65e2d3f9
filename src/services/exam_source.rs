use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::{ExamDefinitionRow, QuestionRow};
use crate::repositories;
use crate::services::errors::EngineError;
use crate::services::question_bank::{ExamDefinition, Question, QuestionBank};

/// Where exam definitions and their question banks come from.
#[async_trait]
pub(crate) trait ExamSource: Send + Sync {
    async fn load_exam_definition(&self, exam_id: &str) -> Result<ExamDefinition, EngineError>;

    async fn load_question_bank(&self, exam_id: &str) -> Result<QuestionBank, EngineError>;
}

#[derive(Clone)]
pub(crate) struct PgExamSource {
    pool: PgPool,
}

impl PgExamSource {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamSource for PgExamSource {
    async fn load_exam_definition(&self, exam_id: &str) -> Result<ExamDefinition, EngineError> {
        let row = repositories::exams::find_by_id(&self.pool, exam_id)
            .await
            .map_err(source_unavailable)?
            .ok_or_else(|| EngineError::ExamNotFound(exam_id.to_string()))?;
        exam_definition_from_row(row)
    }

    async fn load_question_bank(&self, exam_id: &str) -> Result<QuestionBank, EngineError> {
        let rows = repositories::questions::list_by_exam(&self.pool, exam_id)
            .await
            .map_err(source_unavailable)?;
        let questions = rows.into_iter().map(question_from_row).collect::<Result<Vec<_>, _>>()?;
        QuestionBank::new(questions)
    }
}

fn source_unavailable(err: sqlx::Error) -> EngineError {
    tracing::error!(error = %err, "Failed to read exam catalog");
    EngineError::SourceUnavailable(err.to_string())
}

pub(crate) fn exam_definition_from_row(
    row: ExamDefinitionRow,
) -> Result<ExamDefinition, EngineError> {
    let invalid = |reason: &str| EngineError::InvalidExamDefinition {
        id: row.id.clone(),
        reason: reason.to_string(),
    };

    let duration_seconds = u32::try_from(row.duration_seconds)
        .map_err(|_| invalid("duration_seconds must not be negative"))?;
    let presented_question_count = usize::try_from(row.presented_question_count)
        .map_err(|_| invalid("presented_question_count must not be negative"))?;

    let exam = ExamDefinition {
        id: row.id.clone(),
        title: row.title.clone(),
        duration_seconds,
        question_ids: row.question_ids.0.clone(),
        presented_question_count,
    };
    exam.validate()?;
    Ok(exam)
}

pub(crate) fn question_from_row(row: QuestionRow) -> Result<Question, EngineError> {
    let correct_option_index =
        usize::try_from(row.correct_option_index).map_err(|_| EngineError::InvalidQuestion {
            id: row.id.clone(),
            reason: "correct_option_index must not be negative".to_string(),
        })?;

    Ok(Question { id: row.id, text: row.text, options: row.options.0, correct_option_index })
}

#[cfg(test)]
mod tests {
    use sqlx::types::Json;

    use super::*;

    fn exam_row(duration_seconds: i32, presented: i32) -> ExamDefinitionRow {
        ExamDefinitionRow {
            id: "exam-1".to_string(),
            title: "Biology".to_string(),
            duration_seconds,
            question_ids: Json(vec!["q1".to_string(), "q2".to_string()]),
            presented_question_count: presented,
        }
    }

    #[test]
    fn exam_row_converts() {
        let exam = exam_definition_from_row(exam_row(900, 2)).unwrap();
        assert_eq!(exam.duration_seconds, 900);
        assert_eq!(exam.presented_question_count, 2);
        assert_eq!(exam.question_ids, vec!["q1", "q2"]);
    }

    #[test]
    fn negative_and_zero_durations_are_rejected() {
        assert!(matches!(
            exam_definition_from_row(exam_row(-5, 2)),
            Err(EngineError::InvalidExamDefinition { .. })
        ));
        assert!(matches!(
            exam_definition_from_row(exam_row(0, 2)),
            Err(EngineError::InvalidExamDefinition { .. })
        ));
        assert!(matches!(
            exam_definition_from_row(exam_row(60, -1)),
            Err(EngineError::InvalidExamDefinition { .. })
        ));
    }

    #[test]
    fn negative_answer_key_is_rejected() {
        let row = QuestionRow {
            id: "q1".to_string(),
            text: "2 + 2".to_string(),
            options: Json(vec!["3".to_string(), "4".to_string()]),
            correct_option_index: -1,
        };
        assert!(matches!(question_from_row(row), Err(EngineError::InvalidQuestion { .. })));
    }
}
