use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use data_assistant_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{self, GenerateContentChunk};

struct PartialState {
    sse: Sse,
    // Events decoded from a chunk but not yet handed out. A single chunk
    // may carry both the last piece of text and the finish reason.
    pending_events: VecDeque<ModelResponseEvent>,
    completed: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl GeminiResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            pending_events: Default::default(),
            completed: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.completed {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Some proxies close the stream without a finish reason,
                // treat a clean end of stream as a normal stop.
                partial_state.completed = true;
                partial_state
                    .pending_events
                    .push_back(ModelResponseEvent::Completed(
                        ModelFinishReason::Stop,
                    ));
                continue;
            }
            Err(SseError::ChunksError(_)) => {
                return Err(Error::new(
                    "connection interrupted while streaming",
                    ErrorKind::Network,
                ));
            }
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid event stream payload",
                    ErrorKind::MalformedResponse,
                ));
            }
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<GenerateContentChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::MalformedResponse)
            })?;
        process_chunk(&mut partial_state, chunk)?;
    }
}

fn process_chunk(
    partial_state: &mut PartialState,
    chunk: GenerateContentChunk,
) -> Result<(), Error> {
    if let Some(api_error) = chunk.error {
        return Err(Error::from_api_error(api_error));
    }

    if let Some(block_reason) = chunk
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(Error::new(
            format!("prompt blocked: {block_reason}"),
            ErrorKind::Moderated,
        ));
    }

    // Only one candidate is requested.
    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(());
    };

    if let Some(content) = candidate.content {
        let text = content.text();
        if !text.is_empty() {
            partial_state
                .pending_events
                .push_back(ModelResponseEvent::TextDelta(text));
        }
    }

    if let Some(finish_reason) = candidate.finish_reason {
        partial_state.completed = true;
        partial_state
            .pending_events
            .push_back(ModelResponseEvent::Completed(
                proto::parse_finish_reason(&finish_reason),
            ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;

    use super::*;
    use crate::io::Chunks;

    async fn collect(
        chunks: Vec<Bytes>,
    ) -> Result<(String, Option<ModelFinishReason>), Error> {
        let sse = Sse::new(Chunks::from_vec_deque(chunks.into()));
        let mut resp = pin!(GeminiResponse::from_sse(sse));
        let mut text = String::new();
        let mut finish_reason = None;
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            match event {
                ModelResponseEvent::TextDelta(delta) => text.push_str(&delta),
                ModelResponseEvent::Completed(reason) => {
                    assert!(finish_reason.is_none());
                    finish_reason = Some(reason);
                }
            }
        }
        Ok((text, finish_reason))
    }

    #[tokio::test]
    async fn test_simple_events() {
        let (text, finish_reason) =
            collect(vec![Bytes::from_static(include_bytes!(
                "../fixtures/stream_response.txt"
            ))])
            .await
            .unwrap();
        assert_eq!(
            text,
            "The dataset has 15 rows. The `price` column ranges from 3 to 42."
        );
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test]
    async fn test_arbitrary_chunk_boundaries() {
        let fixture: &[u8] = include_bytes!("../fixtures/stream_response.txt");
        let chunks = fixture
            .chunks(7)
            .map(Bytes::copy_from_slice)
            .collect::<Vec<_>>();
        let (text, _) = collect(chunks).await.unwrap();
        assert_eq!(
            text,
            "The dataset has 15 rows. The `price` column ranges from 3 to 42."
        );
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let err = collect(vec![Bytes::from_static(
            b"data: {\"promptFeedback\":{\"blockReason\":\"SAFETY\"}}\r\n\r\n",
        )])
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Moderated);
    }

    #[tokio::test]
    async fn test_error_in_stream() {
        let err = collect(vec![Bytes::from_static(
            b"data: {\"error\":{\"code\":429,\"message\":\"Quota exceeded\",\"status\":\"RESOURCE_EXHAUSTED\"}}\n\n",
        )])
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimitExceeded);
        assert_eq!(err.message(), "Quota exceeded");
    }

    #[tokio::test]
    async fn test_malformed_event() {
        let err = collect(vec![Bytes::from_static(b"data: {not json\n\n")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_stream_without_finish_reason() {
        let (text, finish_reason) = collect(vec![Bytes::from_static(
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n",
        )])
        .await
        .unwrap();
        assert_eq!(text, "Hi");
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
    }
}
