use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use data_assistant_model::{
    GenerationParams, MessagePart, ModelFinishReason, ModelMessage,
    ModelRequest,
};
use serde::{Deserialize, Serialize};

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub error: Option<ApiError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

/// The error object of the API, found both in non-2xx bodies and in the
/// middle of a stream.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    pub error: ApiError,
}

impl CandidateContent {
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

pub fn parse_finish_reason(reason: &str) -> ModelFinishReason {
    match reason {
        "STOP" => ModelFinishReason::Stop,
        "MAX_TOKENS" => ModelFinishReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"
        | "SPII" => ModelFinishReason::Safety,
        _ => ModelFinishReason::Other,
    }
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ModelRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: req.messages.iter().map(create_content).collect(),
        generation_config: create_generation_config(&req.params),
    }
}

#[inline]
fn create_content(msg: &ModelMessage) -> Content {
    let role = match msg {
        ModelMessage::User(_) => "user",
        ModelMessage::Assistant(_) => "model",
    };
    Content {
        role,
        parts: vec![create_part(msg.part())],
    }
}

#[inline]
fn create_part(part: &MessagePart) -> Part {
    match part {
        MessagePart::Text(text) => Part::Text { text: text.clone() },
        MessagePart::Image(image) => Part::InlineData {
            inline_data: Blob {
                mime_type: image.mime.essence_str().to_owned(),
                data: BASE64.encode(&image.data),
            },
        },
    }
}

fn create_generation_config(
    params: &GenerationParams,
) -> Option<GenerationConfig> {
    if *params == GenerationParams::default() {
        return None;
    }
    Some(GenerationConfig {
        max_output_tokens: params.max_output_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.top_k,
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use data_assistant_model::InlineImage;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::User(MessagePart::Text(
                    "You are a data analyst.".to_owned(),
                )),
                ModelMessage::User(MessagePart::Text("Hello".to_owned())),
                ModelMessage::Assistant(MessagePart::Text(
                    "Hi there".to_owned(),
                )),
                ModelMessage::User(MessagePart::Image(InlineImage {
                    mime: mime::IMAGE_PNG,
                    data: Bytes::from_static(b"abc"),
                })),
            ],
            params: GenerationParams {
                max_output_tokens: Some(2048),
                temperature: Some(0.5),
                top_p: None,
                top_k: Some(40),
            },
        };
        let expected = json!({
            "contents": [
                { "role": "user", "parts": [{ "text": "You are a data analyst." }] },
                { "role": "user", "parts": [{ "text": "Hello" }] },
                { "role": "model", "parts": [{ "text": "Hi there" }] },
                {
                    "role": "user",
                    "parts": [{
                        "inlineData": { "mimeType": "image/png", "data": "YWJj" }
                    }]
                }
            ],
            "generationConfig": {
                "maxOutputTokens": 2048,
                "temperature": 0.5,
                "topK": 40
            }
        });
        let actual = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_default_params_are_omitted() {
        let request = ModelRequest {
            messages: vec![ModelMessage::User(MessagePart::Text(
                "Hello".to_owned(),
            ))],
            params: GenerationParams::default(),
        };
        let actual = serde_json::to_value(create_request(&request)).unwrap();
        assert!(actual.get("generationConfig").is_none());
    }

    #[test]
    fn test_parse_chunks() {
        let chunk: GenerateContentChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Olá, "},{"text":"tudo bem?"}],"role":"model"},"finishReason":"STOP","index":0}],"modelVersion":"gemini-2.0-flash"}"#,
        )
        .unwrap();
        let candidate = &chunk.candidates[0];
        assert_eq!(candidate.content.as_ref().unwrap().text(), "Olá, tudo bem?");
        assert_eq!(
            parse_finish_reason(candidate.finish_reason.as_deref().unwrap()),
            ModelFinishReason::Stop
        );

        let chunk: GenerateContentChunk = serde_json::from_str(
            r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#,
        )
        .unwrap();
        assert!(chunk.candidates.is_empty());
        assert_eq!(
            chunk.prompt_feedback.unwrap().block_reason.as_deref(),
            Some("SAFETY")
        );

        let body: ErrorBody = serde_json::from_str(
            r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap();
        assert_eq!(body.error.code, Some(429));
        assert_eq!(body.error.message, "Quota exceeded");
    }
}
