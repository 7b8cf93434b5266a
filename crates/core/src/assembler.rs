use data_assistant_model::{
    GenerationParams, InlineImage, MessagePart, ModelMessage, ModelRequest,
};

use crate::conversation::{ConversationStore, Role, Turn, TurnContent, TurnId};

/// Builds the outbound request from the conversation history.
///
/// The request is laid out as: the system instruction (sent with the user
/// role), the history, then the turns appended by the current submission
/// cycle. Every turn is sent at most once, a fresh turn is never repeated
/// through the history. A diagnostic user turn, such as a file that could
/// not be read, is sent like any other user turn. Diagnostic assistant turns
/// stand in for failed replies and are never sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestAssembler {
    system_instruction: Option<String>,
    params: GenerationParams,
}

impl RequestAssembler {
    /// Creates an assembler.
    #[inline]
    pub fn new(
        system_instruction: Option<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            system_instruction,
            params,
        }
    }

    /// Returns the generation parameters attached to every request.
    #[inline]
    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Assembles a request.
    ///
    /// `fresh` lists the turns appended by the current cycle, in order.
    /// Ids that are not in the store are skipped.
    pub fn assemble(
        &self,
        store: &ConversationStore,
        fresh: &[TurnId],
    ) -> ModelRequest {
        let system = self
            .system_instruction
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| ModelMessage::User(MessagePart::Text(s.clone())));
        let history = without_fresh(store.all(), fresh);
        let tail = fresh.iter().filter_map(|id| store.get(*id));

        let messages = system
            .chain(
                history
                    .chain(tail)
                    .filter(|turn| !is_failed_reply(turn))
                    .map(to_message),
            )
            .collect::<Vec<_>>();
        trace!(
            messages = messages.len(),
            fresh = fresh.len(),
            "assembled request"
        );

        ModelRequest {
            messages,
            params: self.params,
        }
    }
}

/// The de-duplication step: history turns that belong to the current cycle
/// are left out, since they are sent as the tail.
fn without_fresh<'a>(
    history: &'a [Turn],
    fresh: &'a [TurnId],
) -> impl Iterator<Item = &'a Turn> + 'a {
    history.iter().filter(move |turn| !fresh.contains(&turn.id()))
}

#[inline]
fn is_failed_reply(turn: &Turn) -> bool {
    turn.is_diagnostic() && turn.role() == Role::Assistant
}

fn to_message(turn: &Turn) -> ModelMessage {
    let part = match turn.content() {
        TurnContent::Text(text) => MessagePart::Text(text.clone()),
        TurnContent::Image(image) => MessagePart::Image(InlineImage {
            mime: image.mime().clone(),
            data: image.data().clone(),
        }),
    };
    match turn.role() {
        Role::User => ModelMessage::User(part),
        Role::Assistant => ModelMessage::Assistant(part),
    }
}
