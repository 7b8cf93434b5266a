//! Conversation-related types.

use std::fmt::{self, Display};

use bytes::Bytes;
use mime::Mime;

/// Identifies a turn within a session.
///
/// Ids grow monotonically and are never reused, even after the store has
/// been cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(u64);

impl Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn:{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The person using the assistant.
    User,
    /// The model.
    Assistant,
}

/// The content type of a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TurnKind {
    /// Plain text.
    Text,
    /// An image.
    Image,
}

/// The content of a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnContent {
    /// Plain text, including rendered table previews.
    Text(String),
    /// A decoded image.
    Image(ImageContent),
}

impl TurnContent {
    /// Returns the content type.
    #[inline]
    pub fn kind(&self) -> TurnKind {
        match self {
            TurnContent::Text(_) => TurnKind::Text,
            TurnContent::Image(_) => TurnKind::Image,
        }
    }

    /// Returns the text if this is a text content.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TurnContent::Text(text) => Some(text),
            TurnContent::Image(_) => None,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            TurnContent::Text(text) => text.trim().is_empty(),
            TurnContent::Image(image) => image.data.is_empty(),
        }
    }
}

/// An image uploaded by the user.
///
/// The original encoded bytes are kept, so the image can be sent to the
/// model without being re-encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageContent {
    pub(crate) name: String,
    pub(crate) mime: Mime,
    pub(crate) data: Bytes,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl ImageContent {
    /// Returns the file name of the image.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the MIME type of the encoded bytes.
    #[inline]
    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// Returns the encoded image bytes.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the image dimensions in pixels, as `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// An entry in the conversation.
///
/// Turns can only be created by [`ConversationStore`] and are immutable
/// once appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    id: TurnId,
    role: Role,
    content: TurnContent,
    diagnostic: bool,
}

impl Turn {
    /// Returns the id of this turn.
    #[inline]
    pub fn id(&self) -> TurnId {
        self.id
    }

    /// Returns who produced this turn.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the content type of this turn.
    #[inline]
    pub fn kind(&self) -> TurnKind {
        self.content.kind()
    }

    /// Returns the content of this turn.
    #[inline]
    pub fn content(&self) -> &TurnContent {
        &self.content
    }

    /// Returns whether this turn describes a failure instead of carrying
    /// real conversation content.
    #[inline]
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic
    }
}

/// An ordered, append-only history of turns.
#[derive(Clone, Default, Debug)]
pub struct ConversationStore {
    turns: Vec<Turn>,
    next_id: u64,
}

impl ConversationStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn and returns its id.
    ///
    /// Empty content (blank text or an image without bytes) is ignored and
    /// `None` is returned.
    pub fn append(&mut self, role: Role, content: TurnContent) -> Option<TurnId> {
        if content.is_empty() {
            trace!("ignored empty {:?} content", content.kind());
            return None;
        }
        Some(self.push(role, content, false))
    }

    /// Appends a text turn that describes a failure.
    ///
    /// This always appends, a blank message is replaced with a generic one.
    pub fn append_diagnostic<S: Into<String>>(
        &mut self,
        role: Role,
        message: S,
    ) -> TurnId {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Something went wrong.".to_owned();
        }
        self.push(role, TurnContent::Text(message), true)
    }

    /// Removes all turns.
    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Returns all turns in chronological order.
    #[inline]
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the turn with the given id.
    #[inline]
    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        // Ids are increasing, so the turns are sorted by id.
        self.turns
            .binary_search_by_key(&id, Turn::id)
            .ok()
            .map(|idx| &self.turns[idx])
    }

    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns whether the store has no turns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(
        &mut self,
        role: Role,
        content: TurnContent,
        diagnostic: bool,
    ) -> TurnId {
        let id = TurnId(self.next_id);
        self.next_id += 1;
        self.turns.push(Turn {
            id,
            role,
            content,
            diagnostic,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> TurnContent {
        TurnContent::Text(s.to_owned())
    }

    #[test]
    fn test_append_keeps_order() {
        let mut store = ConversationStore::new();
        let u1 = store.append(Role::User, text("Hello")).unwrap();
        let a1 = store.append(Role::Assistant, text("Hi!")).unwrap();
        let u2 = store.append(Role::User, text("Summarize")).unwrap();
        assert!(u1 < a1 && a1 < u2);

        let roles: Vec<_> = store.all().iter().map(Turn::role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::User]);
        assert_eq!(store.get(a1).unwrap().content(), &text("Hi!"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_empty_content_is_ignored() {
        let mut store = ConversationStore::new();
        assert_eq!(store.append(Role::User, text("")), None);
        assert_eq!(store.append(Role::User, text("  \n ")), None);
        assert_eq!(
            store.append(
                Role::User,
                TurnContent::Image(ImageContent {
                    name: "empty.png".to_owned(),
                    mime: mime::IMAGE_PNG,
                    data: Bytes::new(),
                    width: 0,
                    height: 0,
                })
            ),
            None
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_diagnostic() {
        let mut store = ConversationStore::new();
        let id = store.append_diagnostic(Role::Assistant, "");
        let turn = store.get(id).unwrap();
        assert!(turn.is_diagnostic());
        assert_eq!(turn.kind(), TurnKind::Text);
        assert_eq!(turn.content().as_text(), Some("Something went wrong."));
    }

    #[test]
    fn test_clear() {
        let mut store = ConversationStore::new();
        for idx in 0..5 {
            store.append(Role::User, text(&format!("message {idx}")));
        }
        let before = store.append(Role::User, text("last")).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get(before), None);

        // Ids are not reused.
        let after = store.append(Role::User, text("again")).unwrap();
        assert!(after > before);
    }
}
