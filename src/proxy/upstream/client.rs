use axum::http::{header, HeaderMap, Method};
use bytes::Bytes;
use reqwest::{Client, Response};

use crate::error::AppResult;
use crate::models::UpstreamProxyConfig;

/// One upstream round-trip at a time; retry policy lives with the caller.
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(
        proxy: Option<&UpstreamProxyConfig>,
        timeout_secs: u64,
    ) -> Result<Self, String> {
        let client = crate::utils::http::build_upstream_client(proxy, timeout_secs)?;
        Ok(Self { client })
    }

    /// Sends one request. `content-length` is never forwarded: reqwest
    /// recomputes framing from the body it is handed, and `reqwest::Body`
    /// accepts streams, so half-duplex uploads work through the same path.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> AppResult<Response> {
        let mut outbound = headers.clone();
        outbound.remove(header::CONTENT_LENGTH);
        outbound.remove(header::HOST);

        let mut request = self.client.request(method, url).headers(outbound);
        if let Some(bytes) = body {
            request = request.body(reqwest::Body::from(bytes));
        }

        let response = request.send().await?;
        Ok(response)
    }
}
