use std::convert::Infallible;

use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::Response;
use futures::{Stream, StreamExt, stream};

use crate::normalized::{SSE_DONE, NormalizedEvent, sse_event};

/// Stream normalized events as `data:` lines, always ending with `[DONE]`.
pub fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = NormalizedEvent> + Send + 'static,
{
    let body = events
        .map(|event| sse_event(&event))
        .chain(stream::once(async { SSE_DONE.to_string() }))
        .map(Ok::<_, Infallible>);

    build_sse_response(Body::from_stream(body))
}

fn build_sse_response(body: Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("x-accel-buffering", HeaderValue::from_static("no"));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_ends_with_done() {
        let events = stream::iter(vec![
            NormalizedEvent::TextDelta { delta: "Hi".into() },
            NormalizedEvent::Error {
                message: "boom".into(),
            },
        ]);
        let resp = sse_response(events);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");
        assert_eq!(resp.headers()["cache-control"], "no-cache");
        assert_eq!(resp.headers()["x-accel-buffering"], "no");

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(
            text,
            concat!(
                "data: {\"type\":\"text.delta\",\"delta\":\"Hi\"}\n\n",
                "data: {\"type\":\"error\",\"message\":\"boom\"}\n\n",
                "data: [DONE]\n\n"
            )
        );
    }

    #[tokio::test]
    async fn empty_stream_still_sends_done() {
        let resp = sse_response(stream::empty());
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], SSE_DONE.as_bytes());
    }
}
