use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::exam_source::ExamSource;
use crate::services::session_controller::SessionEnv;
use crate::services::session_registry::SessionRegistry;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    exam_source: Arc<dyn ExamSource>,
    session_env: SessionEnv,
    sessions: SessionRegistry,
    db: Option<PgPool>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        exam_source: Arc<dyn ExamSource>,
        session_env: SessionEnv,
        db: Option<PgPool>,
    ) -> Self {
        let sessions = SessionRegistry::new(settings.session().max_concurrent_sessions);
        Self { inner: Arc::new(InnerState { settings, exam_source, session_env, sessions, db }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn exam_source(&self) -> &dyn ExamSource {
        self.inner.exam_source.as_ref()
    }

    pub(crate) fn session_env(&self) -> &SessionEnv {
        &self.inner.session_env
    }

    pub(crate) fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// `None` when running against in-memory collaborators.
    pub(crate) fn db(&self) -> Option<&PgPool> {
        self.inner.db.as_ref()
    }
}
