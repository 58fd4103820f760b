use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tracing::error;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Stream `items` as newline-delimited JSON. Each item is encoded only when
/// the body is polled; an encoding failure ends the body early and the
/// remaining items are never sent.
pub fn ndjson<T>(items: Vec<T>) -> Response
where
    T: Serialize + Send + 'static,
{
    let lines = stream::iter(items).map(|item| {
        serde_json::to_vec(&item)
            .map(|mut line| {
                line.push(b'\n');
                Bytes::from(line)
            })
            .inspect_err(|e| error!(error = %e, "aborting stream: item could not be encoded"))
    });

    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response()
}
