use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::services::errors::EngineError;
use crate::services::session_controller::{SessionController, SessionState};
use crate::tasks::session_runner::{self, SessionHandle};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum AdmissionError {
    #[error("exam session capacity of {limit} reached, try again shortly")]
    AtCapacity { limit: u64 },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub(crate) enum Admission {
    Started(SessionHandle),
    /// The candidate already had a session for this exam.
    Resumed(SessionHandle),
}

impl Admission {
    pub(crate) fn handle(&self) -> &SessionHandle {
        match self {
            Self::Started(handle) | Self::Resumed(handle) => handle,
        }
    }

    pub(crate) fn resumed(&self) -> bool {
        matches!(self, Self::Resumed(_))
    }
}

/// What [`SessionRegistry::drain`] saw at shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrainReport {
    /// Sessions that were saving a result and reached Terminated in time.
    pub(crate) finished: usize,
    /// Sessions still saving when the timeout ran out.
    pub(crate) unfinished: usize,
    /// Active sessions left without a result.
    pub(crate) abandoned: usize,
}

type Owner = (String, String);

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, SessionHandle>,
    by_owner: HashMap<Owner, String>,
}

impl RegistryInner {
    fn live_count(&self) -> usize {
        self.sessions.values().filter(|handle| handle_is_live(handle)).count()
    }

    fn owned_by(&self, owner: &Owner) -> Option<&SessionHandle> {
        self.by_owner
            .get(owner)
            .and_then(|session_id| self.sessions.get(session_id))
            .filter(|handle| !handle.is_closed())
    }
}

fn handle_is_live(handle: &SessionHandle) -> bool {
    !handle.is_closed() && handle.view().state != SessionState::Terminated
}

/// Running sessions by id and by `(exam, candidate)`.
#[derive(Clone)]
pub(crate) struct SessionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    max_live_sessions: u64,
}

impl SessionRegistry {
    pub(crate) fn new(max_live_sessions: u64) -> Self {
        Self { inner: Arc::new(RwLock::new(RegistryInner::default())), max_live_sessions }
    }

    pub(crate) async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.read().await.sessions.get(session_id).cloned()
    }

    pub(crate) async fn find_for_owner(
        &self,
        exam_id: &str,
        candidate_identity: &str,
    ) -> Option<SessionHandle> {
        let owner = (exam_id.to_string(), candidate_identity.to_string());
        self.inner.read().await.owned_by(&owner).cloned()
    }

    pub(crate) async fn live_count(&self) -> usize {
        self.inner.read().await.live_count()
    }

    /// Starts `controller` unless its candidate already has a session for the
    /// exam, in which case that session is returned and `controller` dropped.
    pub(crate) async fn admit(
        &self,
        controller: SessionController,
    ) -> Result<Admission, AdmissionError> {
        let owner =
            (controller.exam_id().to_string(), controller.candidate_identity().to_string());
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.owned_by(&owner).cloned() {
            tracing::info!(
                session_id = %existing.session_id(),
                exam_id = %owner.0,
                "Candidate already has a session for this exam"
            );
            return Ok(Admission::Resumed(existing));
        }

        let live = inner.live_count();
        if live as u64 >= self.max_live_sessions {
            tracing::warn!(
                live_sessions = live,
                limit = self.max_live_sessions,
                exam_id = %owner.0,
                "Rejecting exam session: capacity reached"
            );
            return Err(AdmissionError::AtCapacity { limit: self.max_live_sessions });
        }

        let handle = session_runner::spawn(controller)?;
        inner.by_owner.insert(owner, handle.session_id().to_string());
        inner.sessions.insert(handle.session_id().to_string(), handle.clone());
        tracing::info!(
            session_id = %handle.session_id(),
            live_sessions = live + 1,
            "Exam session admitted"
        );

        Ok(Admission::Started(handle))
    }

    /// Drops sessions terminated at least `retention` ago and sessions whose
    /// task is gone. Returns how many were removed.
    pub(crate) async fn sweep(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;

        let evicted: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, handle)| {
                handle.is_closed()
                    || handle
                        .view()
                        .terminated_at
                        .is_some_and(|terminated_at| now.duration_since(terminated_at) >= retention)
            })
            .map(|(session_id, _)| session_id.clone())
            .collect();

        for session_id in &evicted {
            let Some(handle) = inner.sessions.remove(session_id) else {
                continue;
            };
            let owner = (handle.exam_id().to_string(), handle.candidate_identity().to_string());
            if inner.by_owner.get(&owner) == Some(session_id) {
                inner.by_owner.remove(&owner);
            }
        }

        if !evicted.is_empty() {
            tracing::info!(evicted = evicted.len(), "Evicted finished exam sessions");
        }
        evicted.len()
    }

    /// Waits up to `timeout` for sessions that are saving a result to reach
    /// Terminated. Active sessions are not waited for; each one is logged.
    pub(crate) async fn drain(&self, timeout: Duration) -> DrainReport {
        let handles: Vec<SessionHandle> =
            self.inner.read().await.sessions.values().cloned().collect();

        let mut report = DrainReport::default();
        let mut saving = JoinSet::new();
        for handle in handles {
            let view = handle.view();
            match view.state {
                SessionState::Terminated => {}
                SessionState::Terminating => {
                    let mut updates = handle.subscribe();
                    saving.spawn(async move {
                        while updates.borrow_and_update().state != SessionState::Terminated {
                            if updates.changed().await.is_err() {
                                return false;
                            }
                        }
                        true
                    });
                }
                SessionState::NotStarted | SessionState::Active => {
                    report.abandoned += 1;
                    tracing::error!(
                        session_id = %view.session_id,
                        exam_id = %view.exam_id,
                        candidate_identity = %view.candidate_identity,
                        remaining_seconds = view.remaining_seconds,
                        answered_count = view.answered_count,
                        "Abandoning active exam session at shutdown"
                    );
                }
            }
        }

        let waiting = saving.len();
        let finished = &mut report.finished;
        let all_saved = tokio::time::timeout(timeout, async {
            while let Some(joined) = saving.join_next().await {
                if matches!(joined, Ok(true)) {
                    *finished += 1;
                }
            }
        })
        .await;

        report.unfinished = waiting - report.finished;
        if all_saved.is_err() {
            tracing::error!(
                unfinished = report.unfinished,
                timeout_seconds = timeout.as_secs(),
                "Shutdown drain timed out with results still being saved"
            );
        }
        tracing::info!(
            finished = report.finished,
            unfinished = report.unfinished,
            abandoned = report.abandoned,
            "Session registry drained"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::test_support::{self, MemoryResultStore};

    fn controller(session_id: &str, candidate: &str) -> SessionController {
        controller_with_store(session_id, candidate, Arc::new(MemoryResultStore::new()))
    }

    fn controller_with_store(
        session_id: &str,
        candidate: &str,
        store: Arc<MemoryResultStore>,
    ) -> SessionController {
        let (exam, bank) = test_support::sample_exam(3, 3);
        SessionController::new(
            session_id.to_string(),
            candidate.to_string(),
            Arc::new(exam),
            Arc::new(bank),
            test_support::session_env(store),
            &mut StdRng::seed_from_u64(1),
        )
        .expect("controller")
    }

    async fn submit_until_saving(handle: &SessionHandle) -> tokio::task::JoinHandle<()> {
        let submitter = handle.clone();
        let submit = tokio::spawn(async move {
            let _ = submitter.submit().await;
        });
        let mut view = handle.subscribe();
        view.wait_for(|view| view.state == SessionState::Terminating).await.expect("view");
        submit
    }

    #[tokio::test(start_paused = true)]
    async fn second_begin_resumes_the_first_session() {
        let registry = SessionRegistry::new(10);

        let first = registry.admit(controller("s-1", "alice")).await.unwrap();
        assert!(!first.resumed());
        let again = registry.admit(controller("s-2", "alice")).await.unwrap();
        assert!(again.resumed());
        assert_eq!(again.handle().session_id(), "s-1");

        assert!(registry.get("s-2").await.is_none());
        assert_eq!(registry.live_count().await, 1);
        let found = registry.find_for_owner(&first.handle().view().exam_id, "alice").await;
        assert_eq!(found.map(|handle| handle.session_id().to_string()), Some("s-1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_counts_only_live_sessions() {
        let registry = SessionRegistry::new(1);

        let alice = registry.admit(controller("s-a", "alice")).await.unwrap();
        let err = registry.admit(controller("s-b", "bob")).await.err().expect("at capacity");
        assert_eq!(err, AdmissionError::AtCapacity { limit: 1 });

        alice.handle().submit().await.expect("submit");
        let bob = registry.admit(controller("s-b", "bob")).await.unwrap();
        assert_eq!(bob.handle().session_id(), "s-b");
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_waits_for_retention() {
        let registry = SessionRegistry::new(10);
        let admission = registry.admit(controller("s-x", "carol")).await.unwrap();
        let exam_id = admission.handle().exam_id().to_string();
        registry.admit(controller("s-y", "dave")).await.unwrap();
        admission.handle().submit().await.expect("submit");
        drop(admission);

        assert_eq!(registry.sweep(Duration::from_secs(10)).await, 0);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(registry.sweep(Duration::from_secs(10)).await, 1);

        assert!(registry.get("s-x").await.is_none());
        assert!(registry.find_for_owner(&exam_id, "carol").await.is_none());
        assert!(registry.get("s-y").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_results_being_saved() {
        let registry = SessionRegistry::new(10);
        let store = Arc::new(MemoryResultStore::failing_first(2));
        let saving = registry.admit(controller_with_store("s-save", "alice", store.clone())).await;
        let saving = saving.unwrap();
        registry.admit(controller("s-live", "bob")).await.unwrap();

        let submit = submit_until_saving(saving.handle()).await;
        let report = registry.drain(Duration::from_secs(5)).await;

        assert_eq!(report, DrainReport { finished: 1, unfinished: 0, abandoned: 1 });
        assert_eq!(store.attempts(), 3);
        assert_eq!(store.stored().len(), 1);
        assert_eq!(saving.handle().view().state, SessionState::Terminated);
        submit.await.expect("submit task");
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_after_its_timeout() {
        let registry = SessionRegistry::new(10);
        let store = Arc::new(MemoryResultStore::always_failing());
        let admission = registry.admit(controller_with_store("s-stuck", "carol", store)).await;
        let admission = admission.unwrap();

        let _submit = submit_until_saving(admission.handle()).await;
        let report = registry.drain(Duration::from_millis(50)).await;

        assert_eq!(report, DrainReport { finished: 0, unfinished: 1, abandoned: 0 });
        assert_eq!(admission.handle().view().state, SessionState::Terminating);
    }
}
