//! Request loop
//!
//! One request is read, handled and answered before the next line is read,
//! so responses leave in request order. Backend failures become the `Err`
//! of that request's response; anything that breaks the framing ends the
//! session with an error.

use super::message::{Command, Request, Response};
use crate::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};
use crate::metrics::LatencyTracker;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Input buffer size; bodies of tens of megabytes arrive as a single line
pub const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Where a session is in its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing written yet
    Uninitialized,
    /// Capabilities sent, answering requests
    Serving,
    /// `close` answered, input ended, or the framing broke
    Closed,
}

/// Protocol session over a request stream and a response stream
pub struct CacheProg<R, W> {
    reader: R,
    writer: W,
    backend: Arc<dyn CacheBackend>,
    tracker: Option<Arc<LatencyTracker>>,
    state: SessionState,
    backend_closed: bool,
    line: String,
}

impl<R, W> CacheProg<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            reader,
            writer,
            backend,
            tracker: None,
            state: SessionState::Uninitialized,
            backend_closed: false,
            line: String::new(),
        }
    }

    /// Record `get_overall` / `put_overall` latency into `tracker`
    pub fn with_tracker(mut self, tracker: Arc<LatencyTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Recover the response stream
    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Run the session to completion
    ///
    /// Returns `Ok` after a `close` request or at end of input. The backend
    /// is closed exactly once on every exit path.
    pub async fn run(&mut self) -> CacheResult<()> {
        if self.state != SessionState::Uninitialized {
            return Err(CacheError::protocol("session already ran"));
        }

        let result = self.serve().await;
        self.state = SessionState::Closed;

        if !self.backend_closed {
            self.backend_closed = true;
            if let Err(e) = self.backend.close().await {
                warn!(error = %e, "Closing backend at end of session failed");
            }
        }
        result
    }

    async fn serve(&mut self) -> CacheResult<()> {
        self.write_response(&Response::capabilities()).await?;
        self.state = SessionState::Serving;
        debug!(backend = self.backend.name(), "Session started");

        loop {
            let Some(line) = self.next_line().await? else {
                info!("Input closed, ending session");
                return Ok(());
            };

            let request: Request = serde_json::from_str(&line)
                .map_err(|source| CacheError::MalformedRequest { line, source })?;

            let body = if request.command == Command::Put && request.body_size > 0 {
                self.read_body(&request).await?
            } else {
                Vec::new()
            };

            let response = match request.command {
                Command::Get => self.handle_get(&request).await,
                Command::Put => self.handle_put(&request, body).await,
                Command::Close => self.handle_close(&request).await,
            };
            self.write_response(&response).await?;

            if request.command == Command::Close {
                info!("Close requested, ending session");
                return Ok(());
            }
        }
    }

    /// Next non-blank line, or `None` at end of input
    async fn next_line(&mut self) -> CacheResult<Option<String>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .map_err(|e| CacheError::io("reading request stream", e))?;
            if read == 0 {
                return Ok(None);
            }

            let trimmed = self.line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    /// Read and decode the body line following a put request
    async fn read_body(&mut self, request: &Request) -> CacheResult<Vec<u8>> {
        let line = self.next_line().await?.ok_or_else(|| {
            CacheError::protocol(format!(
                "input ended before the body of put request {}",
                request.id
            ))
        })?;

        let encoded: String = serde_json::from_str(&line).map_err(|e| {
            CacheError::MalformedBody(format!("request {}: not a JSON string: {}", request.id, e))
        })?;
        let body = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
            CacheError::MalformedBody(format!("request {}: invalid base64: {}", request.id, e))
        })?;

        if i64::try_from(body.len()).ok() != Some(request.body_size) {
            return Err(CacheError::MalformedBody(format!(
                "request {}: decoded {} bytes but BodySize is {}",
                request.id,
                body.len(),
                request.body_size
            )));
        }
        Ok(body)
    }

    async fn handle_get(&self, request: &Request) -> Response {
        let mut response = Response::reply(request.id);
        match self
            .timed("get_overall", self.backend.get(&request.action_id))
            .await
        {
            Ok(Some(hit)) => {
                response.output_id = hit.output_id;
                response.size = hit.size;
                response.time = Some(hit.put_time);
                response.disk_path = Some(hit.disk_path);
            }
            Ok(None) => response.miss = true,
            Err(e) => {
                warn!(id = request.id, error = %e, "get failed");
                response.err = e.to_string();
            }
        }
        response
    }

    async fn handle_put(&self, request: &Request, body: Vec<u8>) -> Response {
        let mut response = Response::reply(request.id);
        let Ok(body_size) = u64::try_from(request.body_size) else {
            let e = CacheError::InvalidBodySize(request.body_size);
            warn!(id = request.id, error = %e, "put rejected");
            response.err = e.to_string();
            return response;
        };
        let put = self
            .backend
            .put(&request.action_id, &request.output_id, body, body_size);
        match self.timed("put_overall", put).await {
            Ok(disk_path) => response.disk_path = Some(disk_path),
            Err(e) => {
                warn!(id = request.id, error = %e, "put failed");
                response.err = e.to_string();
            }
        }
        response
    }

    async fn handle_close(&mut self, request: &Request) -> Response {
        let mut response = Response::reply(request.id);
        self.backend_closed = true;
        if let Err(e) = self.backend.close().await {
            warn!(error = %e, "Closing backend failed");
            response.err = e.to_string();
        }
        response
    }

    async fn timed<F: Future>(&self, operation: &str, fut: F) -> F::Output {
        match &self.tracker {
            Some(tracker) => tracker.time(operation, fut).await,
            None => fut.await,
        }
    }

    async fn write_response(&mut self, response: &Response) -> CacheResult<()> {
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| CacheError::io("writing response", e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| CacheError::io("flushing response", e))?;
        Ok(())
    }
}
