mod builder;

use data_assistant_model::{ErrorKind, ModelFinishReason};

use crate::assembler::RequestAssembler;
use crate::conversation::{ConversationStore, Role, Turn, TurnContent, TurnId};
use crate::ingest::{FileFingerprint, UploadedFile, ingest};
use crate::model_client::ModelClient;
pub use builder::SessionBuilder;

/// The stages of a submission cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CycleStage {
    /// No cycle is running.
    #[default]
    Idle,
    /// The attached file has been handled.
    FileIngested,
    /// The user turns of the cycle are in the store.
    UserTurnAppended,
    /// Waiting for the model.
    RequestInFlight,
    /// The reply has been appended.
    AssistantTurnAppended,
    /// The request failed and a diagnostic has been appended instead.
    DiagnosticAppended,
}

/// What the user submits at once: an optional file and optional text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingSubmission {
    /// The attached file.
    pub file: Option<UploadedFile>,
    /// The typed message.
    pub text: Option<String>,
}

impl PendingSubmission {
    /// Creates a text-only submission.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            file: None,
            text: Some(text.into()),
        }
    }

    /// Creates a file-only submission.
    #[inline]
    pub fn file(file: UploadedFile) -> Self {
        Self {
            file: Some(file),
            text: None,
        }
    }

    /// Adds a message to the submission.
    #[inline]
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// The outcome of one submission cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    /// User turns appended by this cycle, in order. Includes the diagnostic
    /// turn of a file that could not be read.
    pub user_turns: Vec<TurnId>,
    /// The assistant turn that closed the cycle, either the reply or a
    /// diagnostic.
    pub assistant_turn: TurnId,
    /// A short description of why the attached file could not be read.
    pub file_diagnostic: Option<String>,
    /// Why generation failed, if it did.
    pub failure: Option<ErrorKind>,
}

/// A conversation with the model.
///
/// The session owns everything that lives as long as the conversation: the
/// turns, the last uploaded file and the stage of the running cycle. Cycles
/// are serialized by `&mut self`, each one ends with exactly one assistant
/// turn.
pub struct Session {
    store: ConversationStore,
    assembler: RequestAssembler,
    model_client: ModelClient,
    last_file: Option<FileFingerprint>,
    stage: CycleStage,
}

impl Session {
    fn from_builder(builder: SessionBuilder) -> Self {
        let SessionBuilder {
            model_client,
            system_instruction,
            params,
            request_timeout,
        } = builder;

        Self {
            store: ConversationStore::new(),
            assembler: RequestAssembler::new(system_instruction, params),
            model_client: model_client.with_request_timeout(request_timeout),
            last_file: None,
            stage: CycleStage::Idle,
        }
    }

    /// Returns all turns in chronological order.
    #[inline]
    pub fn turns(&self) -> &[Turn] {
        self.store.all()
    }

    /// Returns the stage of the current cycle.
    #[inline]
    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    /// Removes all turns and forgets the last uploaded file.
    pub fn clear(&mut self) {
        debug!(turns = self.store.len(), "clearing session");
        self.store.clear();
        self.last_file = None;
    }

    /// Runs one submission cycle.
    ///
    /// Returns `None` if nothing was appended, in which case no request is
    /// sent. That happens for blank text without a file, or a file that was
    /// already submitted last time without any text.
    ///
    /// Failures never escape this method, they end up in the conversation as
    /// diagnostic turns and are listed in the returned report.
    pub async fn submit(
        &mut self,
        submission: PendingSubmission,
    ) -> Option<CycleReport> {
        let PendingSubmission { file, text } = submission;
        let mut user_turns = vec![];
        let mut file_diagnostic = None;

        if let Some(file) = file {
            let fingerprint = file.fingerprint();
            if self.last_file.as_ref() == Some(&fingerprint) {
                debug!(name = file.name(), "skipped a file already submitted");
            } else {
                self.last_file = Some(fingerprint);
                match ingest(&file) {
                    Ok(contents) => {
                        user_turns.extend(contents.into_iter().filter_map(
                            |content| self.store.append(Role::User, content),
                        ));
                    }
                    Err(err) => {
                        warn!("{err}");
                        let message = err.to_string();
                        user_turns.push(
                            self.store
                                .append_diagnostic(Role::User, message.clone()),
                        );
                        file_diagnostic = Some(message);
                    }
                }
                self.set_stage(CycleStage::FileIngested);
            }
        }

        if let Some(text) = text {
            user_turns
                .extend(self.store.append(Role::User, TurnContent::Text(text)));
        }

        if user_turns.is_empty() {
            trace!("nothing to submit");
            self.set_stage(CycleStage::Idle);
            return None;
        }
        self.set_stage(CycleStage::UserTurnAppended);

        let request = self.assembler.assemble(&self.store, &user_turns);
        self.set_stage(CycleStage::RequestInFlight);
        let (assistant_turn, failure) =
            match self.model_client.send_request(request).await {
                Ok(resp) => {
                    if resp.finish_reason != Some(ModelFinishReason::Stop) {
                        warn!(
                            finish_reason = ?resp.finish_reason,
                            "the reply may be incomplete"
                        );
                    }
                    let id = self
                        .store
                        .append(Role::Assistant, TurnContent::Text(resp.text));
                    match id {
                        Some(id) => {
                            self.set_stage(CycleStage::AssistantTurnAppended);
                            (id, None)
                        }
                        None => self.append_failure(ErrorKind::MalformedResponse),
                    }
                }
                Err(err) => self.append_failure(err.kind()),
            };
        self.set_stage(CycleStage::Idle);

        Some(CycleReport {
            user_turns,
            assistant_turn,
            file_diagnostic,
            failure,
        })
    }

    fn append_failure(&mut self, kind: ErrorKind) -> (TurnId, Option<ErrorKind>) {
        let id = self
            .store
            .append_diagnostic(Role::Assistant, failure_message(kind));
        self.set_stage(CycleStage::DiagnosticAppended);
        (id, Some(kind))
    }

    #[inline]
    fn set_stage(&mut self, stage: CycleStage) {
        debug!(from = ?self.stage, to = ?stage, "cycle stage changed");
        self.stage = stage;
    }
}

/// The message shown in place of a reply when generation fails.
fn failure_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Network => {
            "I couldn't reach the model. Check your connection and try again."
        }
        ErrorKind::Timeout => {
            "The model took too long to answer. Please try again."
        }
        ErrorKind::RateLimitExceeded => {
            "The rate limit of the model has been exceeded. Wait a moment and try again."
        }
        ErrorKind::Moderated => "The model declined to answer this request.",
        ErrorKind::MalformedResponse => {
            "The model sent a reply that couldn't be read. Please try again."
        }
        ErrorKind::Other => "Something went wrong while generating a reply.",
    }
}
