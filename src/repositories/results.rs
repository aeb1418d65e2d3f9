use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ExamResultRow;
use crate::db::types::TerminationKind;

pub(crate) const COLUMNS: &str =
    "session_id, candidate_identity, correct_count, percent_score, raw_answers, presentation";

pub(crate) struct NewExamResult<'a> {
    pub(crate) session_id: &'a str,
    pub(crate) candidate_identity: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) correct_count: i32,
    pub(crate) total_questions: i32,
    pub(crate) percent_score: i32,
    pub(crate) submitted_at_epoch_seconds: i64,
    pub(crate) time_taken_seconds: i64,
    pub(crate) raw_answers: serde_json::Value,
    pub(crate) presentation: serde_json::Value,
    pub(crate) termination: TerminationKind,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Inserts a result unless one already exists for the session.
///
/// Returns `true` when this call wrote the row.
pub(crate) async fn insert_if_absent(
    pool: &PgPool,
    result: NewExamResult<'_>,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "INSERT INTO exam_results (
            session_id, candidate_identity, exam_id, correct_count, total_questions,
            percent_score, submitted_at_epoch_seconds, time_taken_seconds, raw_answers,
            presentation, termination, created_at
         )
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
         ON CONFLICT (session_id) DO NOTHING",
    )
    .bind(result.session_id)
    .bind(result.candidate_identity)
    .bind(result.exam_id)
    .bind(result.correct_count)
    .bind(result.total_questions)
    .bind(result.percent_score)
    .bind(result.submitted_at_epoch_seconds)
    .bind(result.time_taken_seconds)
    .bind(Json(result.raw_answers))
    .bind(Json(result.presentation))
    .bind(result.termination)
    .bind(result.created_at)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() == 1)
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<ExamResultRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamResultRow>(&format!(
        "SELECT {COLUMNS}
         FROM exam_results
         WHERE exam_id = $1
         ORDER BY created_at, session_id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn update_score(
    pool: &PgPool,
    session_id: &str,
    correct_count: i32,
    percent_score: i32,
    rescored_at: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_results
         SET correct_count = $2, percent_score = $3, rescored_at = $4
         WHERE session_id = $1",
    )
    .bind(session_id)
    .bind(correct_count)
    .bind(percent_score)
    .bind(rescored_at)
    .execute(pool)
    .await?;
    Ok(())
}
