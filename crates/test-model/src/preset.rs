use data_assistant_model::{ErrorKind, ModelFinishReason};
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "text_delta")]
    TextDelta(String),
    /// Fails the response midway, after the preceding events.
    #[serde(rename = "error")]
    Error(ErrorKind),
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// The finish reason reported after all events.
    pub finish_reason: ModelFinishReason,
    /// If set, the request itself is rejected with this kind of error and
    /// no events are produced.
    pub failure: Option<ErrorKind>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            finish_reason: ModelFinishReason::Stop,
            failure: None,
        }
    }

    /// Creates a `PresetResponse` that delivers `text` as a single delta.
    #[inline]
    pub fn with_text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::TextDelta(text.into())])
    }

    /// Creates a `PresetResponse` whose request is rejected.
    #[inline]
    pub fn with_failure(kind: ErrorKind) -> Self {
        Self {
            events: vec![],
            finish_reason: ModelFinishReason::Stop,
            failure: Some(kind),
        }
    }

    /// Sets the finish reason.
    #[inline]
    pub fn with_finish_reason(mut self, reason: ModelFinishReason) -> Self {
        self.finish_reason = reason;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::TextDelta("The average is ".to_string()),
            PresetEvent::TextDelta("12.5".to_string()),
            PresetEvent::Error(ErrorKind::Network),
        ])
        .with_finish_reason(ModelFinishReason::MaxTokens);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }
}
