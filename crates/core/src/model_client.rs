use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use data_assistant_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that drives a response to completion
/// and provides a type-erased interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    request_timeout: Option<Duration>,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!(messages = req.messages.len(), "sending a request");
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            request_timeout: None,
        }
    }

    /// Limits how long a whole request, including streaming, may take.
    #[inline]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sends a request and waits for the complete reply.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn send_request(&self, req: ModelRequest) -> SendRequestResult {
        let fut = (self.handler_fn)(req);
        let Some(timeout) = self.request_timeout else {
            return fut.await;
        };
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?timeout, "request timed out");
                Err(Box::new(Error::new(ErrorKind::Timeout, "request timed out")))
            }
        }
    }
}

/// A completely received reply from the model client.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelClientResponse {
    /// The concatenated text of the reply, never blank.
    pub text: String,
    /// The reason the model finished generating, if it said so.
    pub finish_reason: Option<ModelFinishReason>,
}

/// Errors raised by the client itself rather than the provider.
#[derive(Debug)]
struct Error {
    kind: ErrorKind,
    message: &'static str,
}

impl Error {
    #[inline]
    fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err}");
            return Err(Box::new(err));
        }
    };

    let mut text = String::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::TextDelta(delta) => {
                text.push_str(&delta);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!(len = text.len(), ?finish_reason, "finished a request");

    if text.trim().is_empty() {
        let err = if finish_reason == Some(ModelFinishReason::Safety) {
            Error::new(ErrorKind::Moderated, "the reply was blocked")
        } else {
            Error::new(ErrorKind::MalformedResponse, "the reply has no text")
        };
        warn!("{err}");
        return Err(Box::new(err));
    }

    Ok(ModelClientResponse {
        text,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use data_assistant_model::{MessagePart, ModelMessage};
    use data_assistant_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn request(text: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User(MessagePart::Text(
                text.to_owned(),
            ))],
            params: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let model_provider = TestModelProvider::default();
        for _ in 0..3 {
            model_provider.add_response(PresetResponse::with_events([
                PresetEvent::TextDelta("How ".to_owned()),
                PresetEvent::TextDelta("are ".to_owned()),
                PresetEvent::TextDelta("you?".to_owned()),
            ]));
        }

        let model_client = ModelClient::new(model_provider.clone());
        for _ in 0..3 {
            let resp = model_client.send_request(request("Hi")).await.unwrap();
            assert_eq!(resp.text, "How are you?");
            assert_eq!(resp.finish_reason, Some(ModelFinishReason::Stop));
        }
        assert_eq!(model_provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        model_provider
            .add_response(PresetResponse::with_failure(ErrorKind::Network));
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::TextDelta("half an ans".to_owned()),
            PresetEvent::Error(ErrorKind::Network),
        ]));

        let model_client = ModelClient::new(model_provider);
        for _ in 0..2 {
            let err = model_client.send_request(request("Hi")).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Network);
        }
        // Out of script.
        let err = model_client.send_request(request("Hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_empty_replies() {
        let model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events(Vec::<PresetEvent>::new()));
        model_provider.add_response(
            PresetResponse::with_events(Vec::<PresetEvent>::new())
                .with_finish_reason(ModelFinishReason::Safety),
        );

        let model_client = ModelClient::new(model_provider);
        let err = model_client.send_request(request("Hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        let err = model_client.send_request(request("Hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Moderated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut model_provider = TestModelProvider::default();
        model_provider.set_delay(Duration::from_secs(30));
        model_provider.add_response(PresetResponse::with_text("late"));

        let model_client = ModelClient::new(model_provider)
            .with_request_timeout(Some(Duration::from_secs(5)));
        let err = model_client.send_request(request("Hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
