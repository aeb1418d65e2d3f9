use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::db::types::TerminationKind;
use crate::repositories;
use crate::services::answer_tracker::AnswerSnapshot;
use crate::services::errors::EngineError;
use crate::services::randomization::PresentationMap;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Immutable outcome of one terminated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ExamResult {
    pub(crate) session_id: String,
    pub(crate) candidate_identity: String,
    pub(crate) exam_id: String,
    pub(crate) correct_count: u32,
    pub(crate) total_questions: u32,
    pub(crate) percent_score: u32,
    pub(crate) submitted_at_epoch_seconds: i64,
    pub(crate) time_taken_seconds: u32,
    pub(crate) raw_answers: AnswerSnapshot,
    pub(crate) presentation: PresentationMap,
    pub(crate) termination: TerminationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AppendOutcome {
    Inserted,
    /// A result for this session id was already stored; nothing was written.
    Duplicate,
}

/// Append-only sink for exam results, keyed by session id.
#[async_trait]
pub(crate) trait ResultStore: Send + Sync {
    async fn append(&self, result: &ExamResult) -> Result<AppendOutcome, EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) max_attempts: u32,
    pub(crate) backoff_base: Duration,
}

impl RetryPolicy {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let session = settings.session();
        Self {
            max_attempts: session.result_store_max_attempts,
            backoff_base: Duration::from_millis(session.result_store_backoff_base_ms),
        }
    }

    /// Wait after the `attempt`-th failure (1-based): base, 2x base, 4x base, ...
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent).min(MAX_BACKOFF)
    }
}

/// Appends `result`, retrying transient failures with exponential backoff.
///
/// Fails with [`EngineError::ResultPersistenceExhausted`] once the policy's
/// attempts are used up.
pub(crate) async fn append_with_retry(
    store: &dyn ResultStore,
    result: &ExamResult,
    policy: RetryPolicy,
) -> Result<AppendOutcome, EngineError> {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match store.append(result).await {
            Ok(outcome) => {
                if attempt > 1 {
                    tracing::info!(
                        session_id = %result.session_id,
                        attempt,
                        "Result append succeeded after retry"
                    );
                }
                return Ok(outcome);
            }
            Err(err) => {
                metrics::counter!("result_append_failures_total").increment(1);
                tracing::warn!(
                    session_id = %result.session_id,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "Result append failed"
                );
                last_error = Some(err);
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    metrics::counter!("result_persistence_exhausted_total").increment(1);
    tracing::error!(
        session_id = %result.session_id,
        attempts = policy.max_attempts,
        last_error = ?last_error,
        "Result append retries exhausted"
    );
    Err(EngineError::ResultPersistenceExhausted { attempts: policy.max_attempts })
}

#[derive(Clone)]
pub(crate) struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn append(&self, result: &ExamResult) -> Result<AppendOutcome, EngineError> {
        let raw_answers = serde_json::to_value(&result.raw_answers)
            .map_err(|err| EngineError::ResultPersistenceFailure(err.to_string()))?;
        let presentation = serde_json::to_value(&result.presentation)
            .map_err(|err| EngineError::ResultPersistenceFailure(err.to_string()))?;

        let row = repositories::results::NewExamResult {
            session_id: &result.session_id,
            candidate_identity: &result.candidate_identity,
            exam_id: &result.exam_id,
            correct_count: to_i32(result.correct_count)?,
            total_questions: to_i32(result.total_questions)?,
            percent_score: to_i32(result.percent_score)?,
            submitted_at_epoch_seconds: result.submitted_at_epoch_seconds,
            time_taken_seconds: i64::from(result.time_taken_seconds),
            raw_answers,
            presentation,
            termination: result.termination,
            created_at: primitive_now_utc(),
        };

        let inserted = repositories::results::insert_if_absent(&self.pool, row)
            .await
            .map_err(|err| EngineError::ResultPersistenceFailure(err.to_string()))?;

        if inserted {
            Ok(AppendOutcome::Inserted)
        } else {
            tracing::info!(session_id = %result.session_id, "Result already stored for session");
            Ok(AppendOutcome::Duplicate)
        }
    }
}

fn to_i32(value: u32) -> Result<i32, EngineError> {
    i32::try_from(value).map_err(|_| {
        EngineError::ResultPersistenceFailure(format!("value {value} does not fit the column"))
    })
}
