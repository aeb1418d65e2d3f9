use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant};
use tracing::Instrument;

use crate::services::answer_tracker::CursorMove;
use crate::services::errors::EngineError;
use crate::services::result_store::ExamResult;
use crate::services::session_controller::{
    PresentedQuestion, SessionController, SessionState, SessionView,
};

const TICK: Duration = Duration::from_secs(1);
const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

pub(crate) enum SessionCommand {
    CurrentQuestion { reply: Reply<PresentedQuestion> },
    Navigate { movement: CursorMove, reply: Reply<PresentedQuestion> },
    Select { position: usize, option_position: usize, reply: Reply<Option<usize>> },
    Submit { reply: Reply<ExamResult> },
}

/// Cheap, cloneable access to a running session.
///
/// Status reads go through the published view and never wait on the session
/// task; everything else is queued behind earlier events.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    session_id: String,
    exam_id: String,
    candidate_identity: String,
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn exam_id(&self) -> &str {
        &self.exam_id
    }

    pub(crate) fn candidate_identity(&self) -> &str {
        &self.candidate_identity
    }

    pub(crate) fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// True once the session task has stopped.
    pub(crate) fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub(crate) async fn current_question(&self) -> Result<PresentedQuestion, EngineError> {
        self.request(|reply| SessionCommand::CurrentQuestion { reply }).await
    }

    pub(crate) async fn navigate(
        &self,
        movement: CursorMove,
    ) -> Result<PresentedQuestion, EngineError> {
        self.request(|reply| SessionCommand::Navigate { movement, reply }).await
    }

    pub(crate) async fn select(
        &self,
        position: usize,
        option_position: usize,
    ) -> Result<Option<usize>, EngineError> {
        self.request(|reply| SessionCommand::Select { position, option_position, reply }).await
    }

    pub(crate) async fn submit(&self) -> Result<ExamResult, EngineError> {
        self.request(|reply| SessionCommand::Submit { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).await.map_err(|_| EngineError::SessionUnavailable)?;
        response.await.map_err(|_| EngineError::SessionUnavailable)?
    }
}

/// Starts the session and moves its controller onto a dedicated task.
pub(crate) fn spawn(mut controller: SessionController) -> Result<SessionHandle, EngineError> {
    controller.start()?;

    let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
    let handle = SessionHandle {
        session_id: controller.session_id().to_string(),
        exam_id: controller.exam_id().to_string(),
        candidate_identity: controller.candidate_identity().to_string(),
        commands,
        view: controller.subscribe(),
    };

    let span = tracing::info_span!(
        "exam_session",
        session_id = %handle.session_id,
        exam_id = %handle.exam_id
    );
    tokio::spawn(run(controller, receiver).instrument(span));

    Ok(handle)
}

/// Serves commands and clock ticks. Once every handle is gone the session
/// keeps counting down until it terminates, so an Active attempt still ends
/// in exactly one result.
async fn run(mut controller: SessionController, mut commands: mpsc::Receiver<SessionCommand>) {
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    let mut detached = false;

    loop {
        if detached && controller.state() != SessionState::Active {
            break;
        }

        tokio::select! {
            biased;
            command = commands.recv(), if !detached => match command {
                Some(command) => handle_command(&mut controller, command).await,
                None => {
                    detached = true;
                    if controller.state() == SessionState::Active {
                        tracing::info!(
                            remaining_seconds = controller.remaining_seconds(),
                            "All handles dropped; session runs until it terminates"
                        );
                    }
                }
            },
            _ = ticker.tick(), if controller.state() == SessionState::Active => {
                if let Some(event) = controller.advance_clock() {
                    // Expiry outcome is published on the view.
                    let _ = controller.on_clock_event(event).await;
                }
            }
        }
    }

    tracing::debug!(
        state = %controller.state(),
        remaining_seconds = controller.remaining_seconds(),
        answered_count = controller.answered_count(),
        "Session task stopped"
    );
}

async fn handle_command(controller: &mut SessionController, command: SessionCommand) {
    // A caller that went away does not stop the session.
    match command {
        SessionCommand::CurrentQuestion { reply } => {
            let _ = reply.send(controller.current_presented_question());
        }
        SessionCommand::Navigate { movement, reply } => {
            let _ = reply.send(controller.navigate(movement));
        }
        SessionCommand::Select { position, option_position, reply } => {
            let _ = reply.send(controller.select(position, option_position));
        }
        SessionCommand::Submit { reply } => {
            let outcome = controller.request_manual_submit().await;
            let _ = reply.send(outcome);
        }
    }
}
