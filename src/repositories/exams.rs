use sqlx::PgPool;

use crate::db::models::ExamDefinitionRow;

pub(crate) const COLUMNS: &str =
    "id, title, duration_seconds, question_ids, presented_question_count";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Option<ExamDefinitionRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamDefinitionRow>(&format!(
        "SELECT {COLUMNS} FROM exam_definitions WHERE id = $1"
    ))
    .bind(exam_id)
    .fetch_optional(pool)
    .await
}
