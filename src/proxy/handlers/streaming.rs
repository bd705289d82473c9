use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;

use crate::error::AppResult;

/// A response headed back to the client.
///
/// `Passthrough` wraps a live upstream response whose body has never been
/// touched; streaming bodies MUST travel this way. `Buffered` holds an error
/// response whose body was read once for classification and is surfaced
/// verbatim from the buffer.
pub enum UpstreamReply {
    Passthrough(reqwest::Response),
    Buffered(BufferedResponse),
}

pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamReply {
    pub fn status(&self) -> StatusCode {
        match self {
            UpstreamReply::Passthrough(resp) => resp.status(),
            UpstreamReply::Buffered(resp) => resp.status,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            UpstreamReply::Passthrough(resp) => resp.headers(),
            UpstreamReply::Buffered(resp) => &resp.headers,
        }
    }

    pub fn is_streaming(&self) -> bool {
        is_streaming_headers(self.headers())
    }
}

fn header_contains(headers: &HeaderMap, name: header::HeaderName, needle: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_lowercase().contains(needle))
}

/// Streaming iff the content type is SSE or the transfer encoding is
/// chunked. Checked on headers only; the body is never sampled.
pub fn is_streaming_headers(headers: &HeaderMap) -> bool {
    header_contains(headers, header::CONTENT_TYPE, "text/event-stream")
        || header_contains(headers, header::TRANSFER_ENCODING, "chunked")
}

/// Reads an upstream response fully into a reusable buffer. Only for error
/// classification paths; never call this on a streaming success.
pub async fn buffer_response(response: reqwest::Response) -> AppResult<BufferedResponse> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;
    Ok(BufferedResponse {
        status,
        headers,
        body,
    })
}

fn copy_response_headers(source: &HeaderMap, builder: axum::http::response::Builder) -> axum::http::response::Builder {
    let mut builder = builder;
    for (name, value) in source {
        // Framing is recomputed by the server layer for the new body.
        if name == header::CONTENT_LENGTH
            || name == header::TRANSFER_ENCODING
            || name == header::CONNECTION
        {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
}

/// Converts an upstream reply into the client-facing response. Passthrough
/// bodies stream byte-for-byte; buffered bodies are replayed from memory.
pub fn into_client_response(reply: UpstreamReply) -> Response {
    match reply {
        UpstreamReply::Passthrough(resp) => {
            let status = resp.status();
            let builder = copy_response_headers(resp.headers(), Response::builder().status(status));
            let stream = resp.bytes_stream().map(|chunk| match chunk {
                Ok(b) => Ok::<Bytes, std::io::Error>(b),
                Err(e) => Err(std::io::Error::other(format!("Upstream stream error: {}", e))),
            });
            builder
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| fallback_response())
        }
        UpstreamReply::Buffered(resp) => {
            let builder =
                copy_response_headers(&resp.headers, Response::builder().status(resp.status));
            builder
                .body(Body::from(resp.body))
                .unwrap_or_else(|_| fallback_response())
        }
    }
}

fn fallback_response() -> Response {
    use axum::response::IntoResponse;
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build response").into_response()
}
