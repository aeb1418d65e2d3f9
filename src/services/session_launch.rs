use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::services::exam_source::ExamSource;
use crate::services::session_controller::{SessionController, SessionEnv};
use crate::services::session_registry::{Admission, AdmissionError, SessionRegistry};

/// Begins an attempt at `exam_id` for the candidate, or hands back the one
/// they already have so a reload never starts a second attempt.
pub(crate) async fn begin_or_resume(
    source: &dyn ExamSource,
    registry: &SessionRegistry,
    env: &SessionEnv,
    exam_id: &str,
    candidate_identity: &str,
) -> Result<Admission, AdmissionError> {
    if let Some(handle) = registry.find_for_owner(exam_id, candidate_identity).await {
        tracing::info!(
            session_id = %handle.session_id(),
            exam_id,
            "Resuming exam session"
        );
        return Ok(Admission::Resumed(handle));
    }

    let exam = source.load_exam_definition(exam_id).await?;
    let bank = source.load_question_bank(exam_id).await?;

    let session_id = Uuid::new_v4().to_string();
    let variant_seed: u64 = rand::random();
    tracing::info!(
        %session_id,
        exam_id,
        bank_size = bank.len(),
        variant_seed,
        "Drawing exam presentation"
    );

    let controller = SessionController::new(
        session_id,
        candidate_identity.to_string(),
        Arc::new(exam),
        Arc::new(bank),
        env.clone(),
        &mut StdRng::seed_from_u64(variant_seed),
    )?;

    registry.admit(controller).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::errors::EngineError;
    use crate::test_support::{self, MemoryResultStore, StaticExamSource};

    fn env() -> SessionEnv {
        test_support::session_env(Arc::new(MemoryResultStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn begins_then_resumes() {
        let (exam, bank) = test_support::sample_exam(5, 4);
        let source = StaticExamSource::new(exam.clone(), bank);
        let registry = SessionRegistry::new(10);
        let env = env();

        let first =
            begin_or_resume(&source, &registry, &env, &exam.id, "alice").await.expect("begin");
        let second =
            begin_or_resume(&source, &registry, &env, &exam.id, "alice").await.expect("resume");
        let other =
            begin_or_resume(&source, &registry, &env, &exam.id, "bob").await.expect("begin");

        assert!(!first.resumed());
        assert!(second.resumed());
        assert_eq!(first.handle().session_id(), second.handle().session_id());
        assert_ne!(first.handle().session_id(), other.handle().session_id());
        assert_eq!(registry.live_count().await, 2);
    }

    #[tokio::test]
    async fn unknown_exam_is_not_found() {
        let (exam, bank) = test_support::sample_exam(2, 2);
        let source = StaticExamSource::new(exam, bank);
        let registry = SessionRegistry::new(10);

        let err = begin_or_resume(&source, &registry, &env(), "nope", "alice")
            .await
            .err()
            .expect("missing exam");
        assert_eq!(err, AdmissionError::Engine(EngineError::ExamNotFound("nope".to_string())));
    }

    #[tokio::test]
    async fn exam_without_questions_cannot_begin() {
        let (mut exam, bank) = test_support::sample_exam(2, 2);
        exam.presented_question_count = 0;
        let exam_id = exam.id.clone();
        let source = StaticExamSource::new(exam, bank);
        let registry = SessionRegistry::new(10);

        let err = begin_or_resume(&source, &registry, &env(), &exam_id, "alice")
            .await
            .err()
            .expect("empty exam");
        assert_eq!(err, AdmissionError::Engine(EngineError::EmptyExam));
        assert_eq!(registry.live_count().await, 0);
    }
}
