use std::error::Error;
use std::fmt;
use std::time::Duration;

use data_assistant_core::conversation::Turn;
use data_assistant_core::{PendingSubmission, Session, SessionBuilder};
use data_assistant_model::{GenerationParams, ModelProvider};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

/// Things that happen in a chat, in the order they happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// A turn has been appended to the conversation.
    Turn(Turn),
    /// An uploaded file could not be read.
    FileDiagnostic(String),
    /// A submission added nothing, so no request was sent. This happens
    /// when the attached file was already submitted and there is no text.
    Skipped,
    /// The conversation has been cleared.
    Cleared,
    /// All queued commands have been processed.
    Idle,
}

/// The error returned when the chat worker is gone.
pub struct ChatClosedError;

impl fmt::Debug for ChatClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClosedError").finish()
    }
}

impl fmt::Display for ChatClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "the chat has been closed".fmt(f)
    }
}

impl Error for ChatClosedError {}

type EventFn = Box<dyn Fn(ChatEvent) + Send + Sync>;

/// [`Chat`] builder.
pub struct ChatBuilder {
    session_builder: SessionBuilder,
    on_event: Option<EventFn>,
}

impl ChatBuilder {
    /// Creates a chat builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self {
            session_builder: SessionBuilder::with_model_provider(provider),
            on_event: None,
        }
    }

    /// Sets the instruction sent ahead of the conversation.
    #[inline]
    pub fn with_system_instruction<S: Into<String>>(
        mut self,
        instruction: S,
    ) -> Self {
        self.session_builder =
            self.session_builder.with_system_instruction(instruction);
        self
    }

    /// Sets the sampling parameters.
    #[inline]
    pub fn with_generation_params(mut self, params: GenerationParams) -> Self {
        self.session_builder =
            self.session_builder.with_generation_params(params);
        self
    }

    /// Limits how long a single request may take.
    #[inline]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_builder =
            self.session_builder.with_request_timeout(timeout);
        self
    }

    /// Attaches a callback to be invoked for every [`ChatEvent`].
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(ChatEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Builds the chat and starts its worker.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Chat {
        let Self {
            session_builder,
            on_event,
        } = self;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(
            run_chat(session_builder.build(), cmd_rx, on_event)
                .instrument(trace_span!("chat")),
        );
        Chat { cmd_tx }
    }
}

/// A chat, like a window that displays messages and has an input box.
///
/// The conversation lives in a background task, commands sent through any
/// clone of the handle are processed one by one in the order they were sent.
/// A command sent while the model is answering waits for that answer. The
/// task exits once every handle is dropped.
#[derive(Clone)]
pub struct Chat {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Chat {
    /// Queues a message, a file or both.
    #[inline]
    pub fn submit(
        &self,
        submission: PendingSubmission,
    ) -> Result<(), ChatClosedError> {
        self.send(Command::Submit(submission))
    }

    /// Queues clearing the conversation.
    #[inline]
    pub fn clear(&self) -> Result<(), ChatClosedError> {
        self.send(Command::Clear)
    }

    /// Returns all turns once the commands queued before are done.
    pub async fn snapshot(&self) -> Result<Vec<Turn>, ChatClosedError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| ChatClosedError)
    }

    #[inline]
    fn send(&self, cmd: Command) -> Result<(), ChatClosedError> {
        self.cmd_tx.send(cmd).map_err(|_| ChatClosedError)
    }
}

#[derive(Debug)]
enum Command {
    Submit(PendingSubmission),
    Clear,
    Snapshot(oneshot::Sender<Vec<Turn>>),
}

async fn run_chat(
    mut session: Session,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    on_event: Option<EventFn>,
) {
    let emit = |event: ChatEvent| {
        trace!("emit: {event:?}");
        if let Some(on_event) = &on_event {
            on_event(event);
        }
    };

    debug!("started");
    // Whether anything changed since the last `Idle`.
    let mut busy = false;
    while let Some(cmd) = cmd_rx.recv().await {
        trace!("received command: {cmd:?}");
        match cmd {
            Command::Submit(submission) => {
                busy = true;
                let before = session.turns().len();
                if let Some(report) = session.submit(submission).await {
                    if let Some(diagnostic) = report.file_diagnostic {
                        emit(ChatEvent::FileDiagnostic(diagnostic));
                    }
                    for turn in &session.turns()[before..] {
                        emit(ChatEvent::Turn(turn.clone()));
                    }
                } else {
                    debug!("nothing was submitted");
                    emit(ChatEvent::Skipped);
                }
            }
            Command::Clear => {
                busy = true;
                session.clear();
                emit(ChatEvent::Cleared);
            }
            Command::Snapshot(tx) => {
                tx.send(session.turns().to_vec()).ok();
            }
        }
        if busy && cmd_rx.is_empty() {
            busy = false;
            emit(ChatEvent::Idle);
        }
    }
    debug!("will terminate");
}
