use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;

use crate::core::time::EpochClock;
use crate::db::types::TerminationKind;
use crate::services::answer_tracker::{AnswerTracker, CursorMove};
use crate::services::errors::EngineError;
use crate::services::question_bank::{ExamDefinition, QuestionBank};
use crate::services::randomization::{derive_presentation, EngineWarning, PresentationMap};
use crate::services::result_store::{
    append_with_retry, AppendOutcome, ExamResult, ResultStore, RetryPolicy,
};
use crate::services::scoring;
use crate::services::session_clock::{ClockEvent, SessionClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SessionState {
    NotStarted,
    Active,
    Terminating,
    Terminated,
}

impl SessionState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub(crate) struct SessionEnv {
    pub(crate) store: Arc<dyn ResultStore>,
    pub(crate) retry: RetryPolicy,
    pub(crate) epoch: Arc<dyn EpochClock>,
}

/// One question as the candidate sees it. Carries no answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PresentedQuestion {
    pub(crate) position: usize,
    pub(crate) question_count: usize,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    pub(crate) selected_option_position: Option<usize>,
}

/// Read-only status published after every state change.
#[derive(Debug, Clone)]
pub(crate) struct SessionView {
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) candidate_identity: String,
    pub(crate) state: SessionState,
    pub(crate) remaining_seconds: u32,
    pub(crate) answered_count: usize,
    pub(crate) question_count: usize,
    pub(crate) cursor: usize,
    pub(crate) started_at_epoch_seconds: Option<i64>,
    pub(crate) warnings: Vec<EngineWarning>,
    pub(crate) result: Option<ExamResult>,
    pub(crate) failure: Option<EngineError>,
    pub(crate) terminated_at: Option<tokio::time::Instant>,
}

/// Lifecycle of one exam attempt: NotStarted -> Active -> Terminating -> Terminated.
///
/// Manual submission and clock expiry both try to leave Active; whichever is
/// handled first wins and the other becomes a no-op, so a session produces at
/// most one result. The controller is driven from a single task and never
/// shared, which is what makes the check-then-set on `state` atomic.
pub(crate) struct SessionController {
    session_id: String,
    candidate_identity: String,
    exam: Arc<ExamDefinition>,
    bank: Arc<QuestionBank>,
    env: SessionEnv,
    state: SessionState,
    clock: SessionClock,
    presentation: PresentationMap,
    tracker: AnswerTracker,
    warnings: Vec<EngineWarning>,
    started_at_epoch_seconds: Option<i64>,
    result: Option<ExamResult>,
    failure: Option<EngineError>,
    terminated_at: Option<tokio::time::Instant>,
    view: watch::Sender<SessionView>,
}

impl SessionController {
    /// Draws the candidate's presentation. The session stays NotStarted until
    /// [`SessionController::start`].
    pub(crate) fn new<R: Rng + ?Sized>(
        session_id: String,
        candidate_identity: String,
        exam: Arc<ExamDefinition>,
        bank: Arc<QuestionBank>,
        env: SessionEnv,
        rng: &mut R,
    ) -> Result<Self, EngineError> {
        let presentation = derive_presentation(&exam, &bank, rng)?;
        let tracker = AnswerTracker::new(presentation.map.option_counts());
        let (view, _) = watch::channel(SessionView {
            session_id: session_id.clone(),
            exam_id: exam.id.clone(),
            candidate_identity: candidate_identity.clone(),
            state: SessionState::NotStarted,
            remaining_seconds: exam.duration_seconds,
            answered_count: 0,
            question_count: presentation.map.len(),
            cursor: 0,
            started_at_epoch_seconds: None,
            warnings: presentation.warnings.clone(),
            result: None,
            failure: None,
            terminated_at: None,
        });

        Ok(Self {
            session_id,
            candidate_identity,
            exam,
            bank,
            env,
            state: SessionState::NotStarted,
            clock: SessionClock::new(),
            presentation: presentation.map,
            tracker,
            warnings: presentation.warnings,
            started_at_epoch_seconds: None,
            result: None,
            failure: None,
            terminated_at: None,
            view,
        })
    }

    pub(crate) fn start(&mut self) -> Result<(), EngineError> {
        if self.state != SessionState::NotStarted {
            return Err(EngineError::SessionNotActive(self.state));
        }

        self.clock.start(self.exam.duration_seconds);
        self.started_at_epoch_seconds = Some(self.env.epoch.now_epoch_seconds());
        self.state = SessionState::Active;
        metrics::counter!("sessions_started_total").increment(1);
        tracing::info!(
            session_id = %self.session_id,
            exam_id = %self.exam.id,
            duration_seconds = self.exam.duration_seconds,
            question_count = self.presentation.len(),
            "Exam session started"
        );
        self.publish();
        Ok(())
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn exam_id(&self) -> &str {
        &self.exam.id
    }

    pub(crate) fn candidate_identity(&self) -> &str {
        &self.candidate_identity
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn remaining_seconds(&self) -> u32 {
        self.clock.remaining_seconds()
    }

    pub(crate) fn answered_count(&self) -> usize {
        self.tracker.answered_count()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    pub(crate) fn select(
        &mut self,
        position: usize,
        option_position: usize,
    ) -> Result<Option<usize>, EngineError> {
        self.ensure_active()?;
        let previous = self.tracker.select(position, option_position)?;
        self.publish();
        Ok(previous)
    }

    pub(crate) fn navigate(
        &mut self,
        movement: CursorMove,
    ) -> Result<PresentedQuestion, EngineError> {
        self.ensure_active()?;
        self.tracker.navigate(movement)?;
        self.publish();
        self.current_presented_question()
    }

    pub(crate) fn current_presented_question(&self) -> Result<PresentedQuestion, EngineError> {
        let position = self.tracker.cursor();
        let entry = self.presentation.entry(position)?;
        let question = self.bank.get(&entry.original_question_id)?;

        let options = entry
            .presented_option_order
            .as_slice()
            .iter()
            .map(|canonical| {
                question.options.get(*canonical).cloned().ok_or_else(|| {
                    EngineError::InvalidQuestion {
                        id: question.id.clone(),
                        reason: format!("option {canonical} missing"),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PresentedQuestion {
            position,
            question_count: self.presentation.len(),
            text: question.text.clone(),
            options,
            selected_option_position: self.tracker.answer(position)?,
        })
    }

    /// Advances the countdown by one second while the session is Active.
    pub(crate) fn advance_clock(&mut self) -> Option<ClockEvent> {
        if self.state != SessionState::Active {
            return None;
        }
        self.clock.advance()
    }

    /// Handles a clock event. Returns the termination outcome when expiry
    /// terminated the session, `None` otherwise.
    pub(crate) async fn on_clock_event(
        &mut self,
        event: ClockEvent,
    ) -> Option<Result<ExamResult, EngineError>> {
        match event {
            ClockEvent::Tick { .. } => {
                self.publish();
                None
            }
            ClockEvent::Expired => {
                if self.state != SessionState::Active {
                    tracing::debug!(
                        session_id = %self.session_id,
                        state = %self.state,
                        "Ignoring expiry for session that already left active"
                    );
                    return None;
                }
                Some(self.terminate(TerminationKind::Expired).await)
            }
        }
    }

    pub(crate) async fn request_manual_submit(&mut self) -> Result<ExamResult, EngineError> {
        self.ensure_active()?;
        self.clock.cancel();
        self.terminate(TerminationKind::Manual).await
    }

    async fn terminate(&mut self, kind: TerminationKind) -> Result<ExamResult, EngineError> {
        let result = match self.enter_termination(kind) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    session_id = %self.session_id,
                    error = %err,
                    "Scoring failed during termination"
                );
                self.finish(None, Some(err.clone()));
                return Err(err);
            }
        };

        match append_with_retry(self.env.store.as_ref(), &result, self.env.retry).await {
            Ok(outcome) => {
                if outcome == AppendOutcome::Inserted {
                    metrics::counter!("results_recorded_total").increment(1);
                }
                tracing::info!(
                    session_id = %self.session_id,
                    exam_id = %self.exam.id,
                    termination = kind.as_str(),
                    correct_count = result.correct_count,
                    total_questions = result.total_questions,
                    percent_score = result.percent_score,
                    "Exam result recorded"
                );
                self.finish(Some(result.clone()), None);
                Ok(result)
            }
            Err(err) => {
                // Last copy of the result lives in the log from here on.
                let unsaved = serde_json::to_string(&result)
                    .unwrap_or_else(|encode_err| format!("<unencodable: {encode_err}>"));
                tracing::error!(
                    session_id = %self.session_id,
                    exam_id = %self.exam.id,
                    candidate_identity = %self.candidate_identity,
                    result = %unsaved,
                    "Exam result could not be saved"
                );
                self.finish(None, Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Active -> Terminating, then snapshot and score.
    fn enter_termination(&mut self, kind: TerminationKind) -> Result<ExamResult, EngineError> {
        self.state = SessionState::Terminating;
        match kind {
            TerminationKind::Manual => metrics::counter!("sessions_submitted_total").increment(1),
            TerminationKind::Expired => metrics::counter!("sessions_expired_total").increment(1),
        }
        self.publish();

        let raw_answers = self.tracker.snapshot();
        let score = scoring::score(&self.bank, &self.presentation, &raw_answers)?;

        Ok(ExamResult {
            session_id: self.session_id.clone(),
            candidate_identity: self.candidate_identity.clone(),
            exam_id: self.exam.id.clone(),
            correct_count: score.correct_count,
            total_questions: score.total_questions,
            percent_score: score.percent()?,
            submitted_at_epoch_seconds: self.env.epoch.now_epoch_seconds(),
            time_taken_seconds: self.clock.elapsed_seconds(),
            raw_answers,
            presentation: self.presentation.clone(),
            termination: kind,
        })
    }

    fn finish(&mut self, result: Option<ExamResult>, failure: Option<EngineError>) {
        self.state = SessionState::Terminated;
        self.result = result;
        self.failure = failure;
        self.terminated_at = Some(tokio::time::Instant::now());
        self.publish();
    }

    fn ensure_active(&self) -> Result<(), EngineError> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(EngineError::SessionNotActive(self.state))
        }
    }

    fn publish(&self) {
        self.view.send_replace(SessionView {
            session_id: self.session_id.clone(),
            exam_id: self.exam.id.clone(),
            candidate_identity: self.candidate_identity.clone(),
            state: self.state,
            remaining_seconds: self.clock.remaining_seconds(),
            answered_count: self.tracker.answered_count(),
            question_count: self.presentation.len(),
            cursor: self.tracker.cursor(),
            started_at_epoch_seconds: self.started_at_epoch_seconds,
            warnings: self.warnings.clone(),
            result: self.result.clone(),
            failure: self.failure.clone(),
            terminated_at: self.terminated_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::test_support::{self, MemoryResultStore};

    fn controller(duration_seconds: u32, store: Arc<MemoryResultStore>) -> SessionController {
        let (mut exam, bank) = test_support::sample_exam(4, 4);
        exam.duration_seconds = duration_seconds;
        let mut controller = SessionController::new(
            "session-1".to_string(),
            "candidate-1".to_string(),
            Arc::new(exam),
            Arc::new(bank),
            test_support::session_env(store),
            &mut StdRng::seed_from_u64(17),
        )
        .expect("controller");
        controller.start().expect("start");
        controller
    }

    #[test]
    fn start_activates_once() {
        let mut controller = controller(60, Arc::new(MemoryResultStore::new()));

        assert_eq!(controller.state(), SessionState::Active);
        assert_eq!(controller.remaining_seconds(), 60);
        assert_eq!(controller.start(), Err(EngineError::SessionNotActive(SessionState::Active)));

        let view = controller.subscribe().borrow().clone();
        assert_eq!(view.state, SessionState::Active);
        assert_eq!(view.question_count, 4);
        assert_eq!(view.started_at_epoch_seconds, Some(test_support::FIXED_EPOCH_SECONDS));
    }

    #[tokio::test]
    async fn submit_then_late_expiry_records_one_result() {
        let store = Arc::new(MemoryResultStore::new());
        let mut controller = controller(60, store.clone());

        for _ in 0..30 {
            assert!(matches!(controller.advance_clock(), Some(ClockEvent::Tick { .. })));
        }
        assert_eq!(controller.remaining_seconds(), 30);

        let result = controller.request_manual_submit().await.expect("submitted");
        assert_eq!(result.termination, TerminationKind::Manual);
        assert_eq!(result.time_taken_seconds, 30);
        assert_eq!(result.submitted_at_epoch_seconds, test_support::FIXED_EPOCH_SECONDS);

        assert!(controller.on_clock_event(ClockEvent::Expired).await.is_none());
        assert!(controller.advance_clock().is_none());
        assert_eq!(store.stored().len(), 1);
        assert_eq!(controller.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn one_second_exam_expires_into_one_result() {
        let store = Arc::new(MemoryResultStore::new());
        let mut controller = controller(1, store.clone());

        let event = controller.advance_clock().expect("event");
        assert_eq!(event, ClockEvent::Expired);
        let result = controller.on_clock_event(event).await.expect("terminated").expect("saved");

        assert_eq!(result.termination, TerminationKind::Expired);
        assert_eq!(result.time_taken_seconds, 1);
        assert_eq!(result.correct_count, 0);
        assert_eq!(result.total_questions, 4);
        assert!(controller.advance_clock().is_none());
        assert_eq!(
            controller.request_manual_submit().await.unwrap_err(),
            EngineError::SessionNotActive(SessionState::Terminated)
        );
        assert_eq!(store.stored().len(), 1);
    }

    #[tokio::test]
    async fn answers_flow_into_the_result() {
        let store = Arc::new(MemoryResultStore::new());
        let mut controller = controller(60, store.clone());

        let correct = test_support::correct_presented_option(
            &controller.bank,
            &controller.presentation,
            0,
        );
        let wrong =
            test_support::wrong_presented_option(&controller.bank, &controller.presentation, 1);
        controller.select(0, correct).unwrap();
        controller.select(1, wrong).unwrap();
        assert_eq!(controller.answered_count(), 2);

        let result = controller.request_manual_submit().await.unwrap();
        assert_eq!(result.correct_count, 1);
        assert_eq!(result.percent_score, 25);
        assert_eq!(result.raw_answers.len(), 2);
        assert_eq!(store.stored()[0], result);
    }

    #[tokio::test]
    async fn input_is_rejected_after_termination() {
        let mut controller = controller(60, Arc::new(MemoryResultStore::new()));
        controller.request_manual_submit().await.unwrap();

        assert_eq!(
            controller.select(0, 0).unwrap_err(),
            EngineError::SessionNotActive(SessionState::Terminated)
        );
        assert!(controller.navigate(CursorMove::Next).is_err());
        assert!(controller.current_presented_question().is_ok());
    }

    #[test]
    fn presented_question_follows_the_permutation() {
        let mut controller = controller(60, Arc::new(MemoryResultStore::new()));
        let presented = controller.navigate(CursorMove::To(2)).unwrap();
        let entry = controller.presentation.entry(2).unwrap();
        let question = controller.bank.get(&entry.original_question_id).unwrap();

        assert_eq!(presented.position, 2);
        assert_eq!(presented.question_count, 4);
        assert_eq!(presented.text, question.text);
        for (slot, canonical) in entry.presented_option_order.as_slice().iter().enumerate() {
            assert_eq!(presented.options[slot], question.options[*canonical]);
        }
        assert_eq!(presented.selected_option_position, None);

        controller.select(2, 1).unwrap();
        let again = controller.current_presented_question().unwrap();
        assert_eq!(again.selected_option_position, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_is_retried_before_terminating() {
        let store = Arc::new(MemoryResultStore::failing_first(2));
        let mut controller = controller(60, store.clone());

        let result = controller.request_manual_submit().await.expect("eventually saved");
        assert_eq!(store.attempts(), 3);
        assert_eq!(store.stored(), vec![result]);
        assert_eq!(controller.state(), SessionState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_failure() {
        let store = Arc::new(MemoryResultStore::always_failing());
        let mut controller = controller(60, store.clone());
        let view = controller.subscribe();

        let started = tokio::time::Instant::now();
        let err = controller.request_manual_submit().await.unwrap_err();

        assert_eq!(err, EngineError::ResultPersistenceExhausted { attempts: 3 });
        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert!(store.stored().is_empty());

        let view = view.borrow();
        assert_eq!(view.state, SessionState::Terminated);
        assert_eq!(view.failure, Some(err));
        assert!(view.result.is_none());
        assert!(view.terminated_at.is_some());
    }
}
