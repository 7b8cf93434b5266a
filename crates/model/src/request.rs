use bytes::Bytes;
use mime::Mime;
use serde::{Deserialize, Serialize};

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelRequest {
    /// The input messages, oldest first.
    pub messages: Vec<ModelMessage>,
    /// Sampling parameters for this request.
    pub params: GenerationParams,
}

/// A single role-tagged message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// Content written by the user (system instructions are sent with
    /// this role too).
    User(MessagePart),
    /// Content previously generated by the model.
    Assistant(MessagePart),
}

impl ModelMessage {
    /// Returns the part carried by this message.
    #[inline]
    pub fn part(&self) -> &MessagePart {
        match self {
            ModelMessage::User(part) | ModelMessage::Assistant(part) => part,
        }
    }
}

/// The payload of a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessagePart {
    /// Plain text.
    Text(String),
    /// An encoded image sent inline with the request.
    Image(InlineImage),
}

/// An encoded image, e.g. the raw bytes of a PNG file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InlineImage {
    /// The MIME type of `data`.
    pub mime: Mime,
    /// The encoded image bytes.
    pub data: Bytes,
}

/// Sampling parameters.
///
/// Unset fields are left to the provider's defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Upper bound of generated tokens.
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling probability mass.
    pub top_p: Option<f32>,
    /// Number of highest-probability tokens considered per step.
    pub top_k: Option<u32>,
}
