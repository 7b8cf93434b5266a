//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use data_assistant_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
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

pub struct TestModelResponse {
    events: VecDeque<PresetEvent>,
    finish_reason: Option<ModelFinishReason>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            if let Some(event) = this.events.pop_front() {
                return Poll::Ready(match event {
                    PresetEvent::TextDelta(text) => {
                        Ok(Some(ModelResponseEvent::TextDelta(text)))
                    }
                    PresetEvent::Error(kind) => {
                        this.events.clear();
                        this.finish_reason = None;
                        Err(Error {
                            message: "preset error event",
                            kind,
                        })
                    }
                });
            }

            // In case this method is called after completion, the finish
            // reason has been taken and `None` is returned.
            return Poll::Ready(Ok(this
                .finish_reason
                .take()
                .map(ModelResponseEvent::Completed)));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond. Each request consumes the next preset response in
/// order. If the script runs out, an error will be returned.
///
/// Clones share the script and the request log, so a clone can be kept by
/// the test to inspect what was sent after handing the provider over.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<VecDeque<PresetResponse>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        lock(&self.script).push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far, oldest first.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    /// Returns the number of preset responses not consumed yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelProvider")
            .field("remaining", &self.remaining())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        lock(&self.requests).push(req.clone());

        let result = 'blk: {
            let Some(preset) = lock(&self.script).pop_front() else {
                break 'blk Err(Error {
                    message: "no enough steps",
                    kind: ErrorKind::Other,
                });
            };
            if let Some(kind) = preset.failure {
                break 'blk Err(Error {
                    message: "preset failure",
                    kind,
                });
            }
            Ok(TestModelResponse {
                events: preset.events.into(),
                finish_reason: Some(preset.finish_reason),
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            })
        };
        ready(result)
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use data_assistant_model::{MessagePart, ModelMessage};

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> Result<(String, Option<ModelFinishReason>), Error> {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut finish_reason = None;
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            match event {
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason)
                }
                ModelResponseEvent::TextDelta(delta) => {
                    msg.push_str(&delta);
                }
            }
        }
        Ok((msg, finish_reason))
    }

    fn user_request(text: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User(MessagePart::Text(
                text.to_owned(),
            ))],
            params: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::TextDelta("Hello, ".to_owned()),
            PresetEvent::TextDelta("world!".to_owned()),
        ]));
        provider.add_response(
            PresetResponse::with_text("Truncated")
                .with_finish_reason(ModelFinishReason::MaxTokens),
        );

        let resp = provider.send_request(&user_request("Hi")).await.unwrap();
        let (msg, reason) = collect_response(resp).await.unwrap();
        assert_eq!(msg, "Hello, world!");
        assert_eq!(reason, Some(ModelFinishReason::Stop));

        let resp = provider
            .send_request(&user_request("Tell me more"))
            .await
            .unwrap();
        let (msg, reason) = collect_response(resp).await.unwrap();
        assert_eq!(msg, "Truncated");
        assert_eq!(reason, Some(ModelFinishReason::MaxTokens));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], user_request("Tell me more"));
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_failures() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_failure(
            ErrorKind::RateLimitExceeded,
        ));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::TextDelta("partial".to_owned()),
            PresetEvent::Error(ErrorKind::Network),
        ]));

        let err = provider
            .send_request(&user_request("Hi"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);

        let resp = provider.send_request(&user_request("Hi")).await.unwrap();
        let err = collect_response(resp).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        // The script is exhausted.
        let err = provider
            .send_request(&user_request("Hi"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(provider.requests().len(), 3);
    }
}
