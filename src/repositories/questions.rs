use sqlx::PgPool;

use crate::db::models::QuestionRow;

pub(crate) const COLUMNS: &str = "id, text, options, correct_option_index";

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<QuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {COLUMNS}
         FROM questions
         WHERE exam_id = $1
         ORDER BY order_index, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}
