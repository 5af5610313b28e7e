// SPDX-License-Identifier: MIT OR Apache-2.0
//! The upstream dispatcher: one POST per request, a pull-based decoded
//! event stream back.

use crate::cancel::CancelToken;
use crate::template::RequestTemplate;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use qgw_amazonq::QPayload;
use qgw_error::GatewayError;
use qgw_eventstream::{EventStreamDecoder, STREAMING_MAX_ERRORS, UpstreamEvent};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Connect timeout for the upstream POST.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Read timeout for the streaming response.
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Diagnostic body bytes buffered from an error response.
const ERROR_BODY_LIMIT: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Sends transcoded payloads to the Q streaming endpoint.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    template: RequestTemplate,
}

impl Dispatcher {
    /// Create a dispatcher with its own HTTP client and the gateway's
    /// connect/read timeouts.
    pub fn new(template: RequestTemplate) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::ConfigInvalid(format!("http client: {e}")))?;
        Ok(Self::with_client(client, template))
    }

    /// Create a dispatcher over an existing client (connection pooling
    /// across requests is the host's concern).
    pub fn with_client(client: reqwest::Client, template: RequestTemplate) -> Self {
        Self { client, template }
    }

    /// POST the payload and return the decoded upstream event stream.
    ///
    /// A status of 400 or above buffers up to 8 KiB of the body together
    /// with the `x-amzn-requestid` / `x-amzn-errortype` headers, closes
    /// the response, and fails with [`GatewayError::Upstream`].
    pub async fn send(
        &self,
        access_token: &str,
        payload: &QPayload,
    ) -> Result<QEventStream, GatewayError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| GatewayError::InvalidInput(format!("unserializable payload: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in self.template.merge_headers(access_token) {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "skipping malformed template header"),
            }
        }

        let response = self
            .client
            .post(&self.template.url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(upstream_failure(status, response).await);
        }

        debug!(status, "upstream stream opened");
        Ok(QEventStream::new(response))
    }
}

fn request_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(format!("upstream request: {err}"))
    } else {
        GatewayError::Upstream {
            status: 502,
            request_id: None,
            error_type: None,
            body: format!("transport failure: {err}"),
        }
    }
}

/// Drain diagnostics from an error response, bounded to 8 KiB.
async fn upstream_failure(status: u16, mut response: reqwest::Response) -> GatewayError {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let request_id = header("x-amzn-requestid").or_else(|| header("x-amz-request-id"));
    let error_type = header("x-amzn-errortype");

    let mut buf: Vec<u8> = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                buf.extend_from_slice(&chunk);
                if buf.len() >= ERROR_BODY_LIMIT {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(%e, "failed reading upstream error body");
                break;
            }
        }
    }
    buf.truncate(ERROR_BODY_LIMIT);
    let body = String::from_utf8_lossy(&buf).into_owned();

    warn!(status, ?request_id, ?error_type, "upstream error");
    GatewayError::Upstream {
        status,
        request_id,
        error_type,
        body,
    }
}

// ---------------------------------------------------------------------------
// QEventStream
// ---------------------------------------------------------------------------

/// Pull-based stream of decoded upstream events.
///
/// Owns the HTTP response through its byte stream; dropping the value,
/// whether on completion, error, or caller abandonment, closes the
/// connection.
pub struct QEventStream {
    bytes: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    decoder: EventStreamDecoder,
    ready: VecDeque<UpstreamEvent>,
    source_done: bool,
}

impl std::fmt::Debug for QEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QEventStream")
            .field("ready", &self.ready)
            .field("source_done", &self.source_done)
            .finish()
    }
}

impl QEventStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            bytes: Box::pin(response.bytes_stream()),
            decoder: EventStreamDecoder::with_options(STREAMING_MAX_ERRORS, true),
            ready: VecDeque::new(),
            source_done: false,
        }
    }

    /// Next decoded event; `Ok(None)` when the upstream closed cleanly.
    ///
    /// A decoder that stopped (error budget exhausted) surfaces
    /// [`GatewayError::UpstreamProtocol`] after any already-decoded events
    /// have been drained; the caller decides whether to end the client
    /// stream gracefully (§ content already sent) or answer with a 5xx.
    pub async fn next_event(&mut self) -> Result<Option<UpstreamEvent>, GatewayError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }
            if self.decoder.is_stopped() {
                return Err(GatewayError::UpstreamProtocol(format!(
                    "decoder stopped after {} CRC errors, {} bytes discarded",
                    self.decoder.crc_errors(),
                    self.decoder.discarded_bytes()
                )));
            }
            if self.source_done {
                return Ok(None);
            }

            match self.bytes.next().await {
                None => self.source_done = true,
                Some(Err(e)) => {
                    self.source_done = true;
                    return Err(if e.is_timeout() {
                        GatewayError::Timeout(format!("upstream read: {e}"))
                    } else {
                        GatewayError::UpstreamProtocol(format!("upstream read: {e}"))
                    });
                }
                Some(Ok(chunk)) => {
                    for frame in self.decoder.feed(&chunk) {
                        if let Some(event) = UpstreamEvent::from_frame(&frame) {
                            self.ready.push_back(event);
                        }
                    }
                }
            }
        }
    }

    /// [`next_event`](Self::next_event), racing client cancellation.
    /// Cancellation drops nothing by itself; the caller drops `self`,
    /// which closes the upstream response.
    pub async fn next_event_or_cancelled(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<Option<UpstreamEvent>, GatewayError> {
        tokio::select! {
            () = cancel.cancelled() => Err(GatewayError::Cancelled),
            event = self.next_event() => event,
        }
    }

    /// Decoder counters for diagnostics.
    pub fn decoder(&self) -> &EventStreamDecoder {
        &self.decoder
    }
}
