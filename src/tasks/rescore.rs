use anyhow::Context;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::ExamResultRow;
use crate::repositories;
use crate::services::answer_tracker::AnswerSnapshot;
use crate::services::exam_source::question_from_row;
use crate::services::question_bank::QuestionBank;
use crate::services::randomization::PresentationMap;
use crate::services::scoring;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScoreChange {
    pub(crate) session_id: String,
    pub(crate) candidate_identity: String,
    pub(crate) old_correct: i32,
    pub(crate) new_correct: i32,
    pub(crate) old_percent: i32,
    pub(crate) new_percent: i32,
}

#[derive(Debug, Default)]
pub(crate) struct RescoreReport {
    pub(crate) examined: usize,
    pub(crate) changes: Vec<ScoreChange>,
    /// Results that could not be re-graded, with the reason.
    pub(crate) skipped: Vec<(String, String)>,
    pub(crate) applied: bool,
}

/// Re-grades one stored result against `bank`. `None` when the score is
/// unchanged.
pub(crate) fn rescore_row(
    bank: &QuestionBank,
    row: &ExamResultRow,
) -> anyhow::Result<Option<ScoreChange>> {
    let presentation: PresentationMap = serde_json::from_value(row.presentation.0.clone())
        .context("stored presentation is malformed")?;
    let answers: AnswerSnapshot = serde_json::from_value(row.raw_answers.0.clone())
        .context("stored raw answers are malformed")?;

    let score = scoring::score(bank, &presentation, &answers)?;
    let new_correct = i32::try_from(score.correct_count)?;
    let new_percent = i32::try_from(score.percent()?)?;

    if new_correct == row.correct_count && new_percent == row.percent_score {
        return Ok(None);
    }

    Ok(Some(ScoreChange {
        session_id: row.session_id.clone(),
        candidate_identity: row.candidate_identity.clone(),
        old_correct: row.correct_count,
        new_correct,
        old_percent: row.percent_score,
        new_percent,
    }))
}

/// Re-grades every stored result of `exam_id` with the current answer key.
/// Writes only when `apply` is set, and then only the score columns.
pub(crate) async fn run(
    pool: &PgPool,
    exam_id: &str,
    apply: bool,
) -> anyhow::Result<RescoreReport> {
    let rows = repositories::questions::list_by_exam(pool, exam_id)
        .await
        .context("Failed to load question bank")?;
    let questions = rows.into_iter().map(question_from_row).collect::<Result<Vec<_>, _>>()?;
    let bank = QuestionBank::new(questions)?;

    let results = repositories::results::list_by_exam(pool, exam_id)
        .await
        .context("Failed to load stored results")?;

    let mut report =
        RescoreReport { examined: results.len(), applied: apply, ..Default::default() };
    for row in &results {
        match rescore_row(&bank, row) {
            Ok(Some(change)) => {
                if apply {
                    repositories::results::update_score(
                        pool,
                        &change.session_id,
                        change.new_correct,
                        change.new_percent,
                        primitive_now_utc(),
                    )
                    .await
                    .with_context(|| format!("Failed to update result {}", change.session_id))?;
                }
                report.changes.push(change);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    session_id = %row.session_id,
                    error = %err,
                    "Skipping result that cannot be re-graded"
                );
                report.skipped.push((row.session_id.clone(), format!("{err:#}")));
            }
        }
    }

    tracing::info!(
        exam_id,
        examined = report.examined,
        changed = report.changes.len(),
        skipped = report.skipped.len(),
        applied = apply,
        "Rescore finished"
    );
    Ok(report)
}
