//! HTTP transports.
//!
//! - [`ReqwestTransport`]: pooled `reqwest` client with fixed connect and read timeouts
//! - [`MockTransport`]: scripted replies for tests, counts every call
//! - [`TransportSlot`]: lazily acquired, explicitly released transport handle
//!
//! Neither transport retries. A non-2xx answer becomes
//! [`LlmError::ProviderError`] carrying the status and body.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{LlmError, Result};
use crate::traits::{HttpRequest, HttpTransport, LineStream};

// ============================================================================
// reqwest
// ============================================================================

/// Transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client where connecting, and every single read, is bounded
    /// by `timeout`. A stream that keeps delivering chunks is never cut.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn send(&self, request: &HttpRequest) -> Result<reqwest::Response> {
        debug!(url = %request.url, "POST");
        let response = self
            .client
            .post(&request.url)
            .bearer_auth(&request.api_key)
            .json(&request.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %request.url, status = status.as_u16(), "provider returned an error");
            return Err(LlmError::ProviderError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, request: &HttpRequest) -> Result<JsonValue> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_stream(&self, request: &HttpRequest) -> Result<LineStream> {
        let response = self.send(request).await?;
        Ok(split_lines(response.bytes_stream()))
    }
}

/// Split a byte stream into lines without `\n` / `\r\n` terminators.
///
/// Lines may span chunk boundaries, including inside a multi-byte character.
/// A trailing line without terminator is still yielded. An error from the
/// byte stream is yielded once and ends the line stream.
pub fn split_lines<S, B, E>(bytes: S) -> LineStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    let state = (Box::pin(bytes), Vec::<u8>::new(), false);
    let lines = stream::unfold(state, |(mut bytes, mut buffer, mut ended)| async move {
        loop {
            if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                let line = String::from_utf8_lossy(&line).into_owned();
                return Some((Ok(line), (bytes, buffer, ended)));
            }
            if ended {
                if buffer.is_empty() {
                    return None;
                }
                let line = String::from_utf8_lossy(&buffer).into_owned();
                buffer.clear();
                return Some((Ok(line), (bytes, buffer, ended)));
            }
            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    ended = true;
                    buffer.clear();
                    return Some((Err(e.into()), (bytes, buffer, ended)));
                }
                None => ended = true,
            }
        }
    });
    Box::pin(lines)
}

// ============================================================================
// Lazy slot
// ============================================================================

#[derive(Debug)]
enum TransportSource {
    Reqwest { timeout: Duration },
    Fixed(Arc<dyn HttpTransport>),
}

/// Holds the shared transport between first use and shutdown.
///
/// Streams already handed out keep their own reference, so releasing the
/// slot never cuts an in-flight response.
#[derive(Debug)]
pub struct TransportSlot {
    source: TransportSource,
    current: Mutex<Option<Arc<dyn HttpTransport>>>,
}

impl TransportSlot {
    /// Slot that builds a [`ReqwestTransport`] on first use.
    pub fn reqwest(timeout: Duration) -> Self {
        Self {
            source: TransportSource::Reqwest { timeout },
            current: Mutex::new(None),
        }
    }

    /// Slot that always hands out `transport`.
    pub fn fixed(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            source: TransportSource::Fixed(transport),
            current: Mutex::new(None),
        }
    }

    /// Get the transport, creating it if needed.
    pub async fn acquire(&self) -> Result<Arc<dyn HttpTransport>> {
        let mut current = self.current.lock().await;
        if let Some(transport) = current.as_ref() {
            return Ok(Arc::clone(transport));
        }
        let transport: Arc<dyn HttpTransport> = match &self.source {
            TransportSource::Reqwest { timeout } => {
                debug!(timeout_secs = timeout.as_secs(), "opening HTTP client");
                Arc::new(ReqwestTransport::new(*timeout)?)
            }
            TransportSource::Fixed(transport) => Arc::clone(transport),
        };
        *current = Some(Arc::clone(&transport));
        Ok(transport)
    }

    /// Drop the held transport. The next call acquires a fresh one.
    pub async fn release(&self) {
        if self.current.lock().await.take().is_some() {
            debug!("released HTTP client");
        }
    }

    /// True while a transport is held.
    pub async fn is_acquired(&self) -> bool {
        self.current.lock().await.is_some()
    }
}

// ============================================================================
// Mock
// ============================================================================

/// One scripted answer of a [`MockTransport`].
#[derive(Debug)]
pub enum MockReply {
    /// Body for `post_json`.
    Json(JsonValue),
    /// Lines for `post_stream`; an `Err` item simulates a broken connection.
    Lines(Vec<Result<String>>),
    /// Failure returned before any body.
    Error(LlmError),
}

impl MockReply {
    /// Stream reply from plain lines.
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Lines(lines.into_iter().map(|l| Ok(l.into())).collect())
    }
}

/// Scripted transport for tests.
///
/// Replies are consumed in order. Every call is counted and recorded, even
/// when no reply is left.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<HttpRequest>>,
    call_count: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply at construction time.
    pub fn with_reply(mut self, reply: MockReply) -> Self {
        self.replies.get_mut().push_back(reply);
        self
    }

    /// Queue a reply.
    pub async fn push(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Number of requests made so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request made so far, in order.
    pub async fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().await.clone()
    }

    /// The most recent request.
    pub async fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().await.last().cloned()
    }

    async fn next_reply(&self, request: &HttpRequest) -> Result<MockReply> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::NetworkError("MockTransport: no scripted reply".to_string()))
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post_json(&self, request: &HttpRequest) -> Result<JsonValue> {
        match self.next_reply(request).await? {
            MockReply::Json(body) => Ok(body),
            MockReply::Error(e) => Err(e),
            MockReply::Lines(_) => Err(LlmError::InvalidRequest(
                "MockTransport: stream reply scripted for a JSON request".to_string(),
            )),
        }
    }

    async fn post_stream(&self, request: &HttpRequest) -> Result<LineStream> {
        match self.next_reply(request).await? {
            MockReply::Lines(lines) => Ok(Box::pin(stream::iter(lines))),
            MockReply::Error(e) => Err(e),
            MockReply::Json(_) => Err(LlmError::InvalidRequest(
                "MockTransport: JSON reply scripted for a stream request".to_string(),
            )),
        }
    }
}
