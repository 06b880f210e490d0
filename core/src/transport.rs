//! Executing `HttpRequest`s against the network.
//!
//! `UreqTransport` is the default blocking implementation: one request per
//! call, a fixed per-call timeout, no retry. Status codes are returned as data
//! so the response interpreter can classify them.
//!
//! A `CancelToken` passed to `send` aborts the call while it is in flight:
//! the request then runs on a worker thread and the caller returns as soon as
//! the token is cancelled or its deadline passes.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Per-call timeout used by `UreqTransport::new`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How often an in-flight call re-checks its `CancelToken`.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cancellation signal with an optional deadline, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also expires `after` from now.
    pub fn with_deadline(after: Duration) -> Self {
        Self {
            canceled: Arc::default(),
            deadline: Some(Instant::now() + after),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// `Canceled` once cancelled, `Timeout` once the deadline has passed.
    pub fn check(&self) -> Result<(), ApiError> {
        if self.is_canceled() {
            return Err(ApiError::Canceled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ApiError::Timeout);
        }
        Ok(())
    }
}

/// Sends one request and returns the bridge's response, whatever its status.
///
/// With a `cancel` token the call must give up once `cancel.check()` fails,
/// including while waiting on the network.
pub trait Transport {
    fn send(&self, request: &HttpRequest, cancel: Option<&CancelToken>) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest, cancel: Option<&CancelToken>) -> Result<HttpResponse, ApiError> {
        (**self).send(request, cancel)
    }
}

/// Blocking transport backed by a `ureq::Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }

    fn call(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = request.url.as_str();
        let body = request.body.as_deref();

        let result = match (request.method, body) {
            (HttpMethod::Get, _) => self.agent.get(url).call(),
            (HttpMethod::Delete, _) => self.agent.delete(url).call(),
            (HttpMethod::Post, Some(body)) => self
                .agent
                .post(url)
                .content_type("application/json")
                .send(body.as_bytes()),
            (HttpMethod::Post, None) => self.agent.post(url).send_empty(),
            (HttpMethod::Put, Some(body)) => self
                .agent
                .put(url)
                .content_type("application/json")
                .send(body.as_bytes()),
            (HttpMethod::Put, None) => self.agent.put(url).send_empty(),
        };

        let mut response = result.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(transport_error)?;

        debug!(method = %request.method, status, "bridge responded");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Run the call on a worker thread and wait for it while polling `cancel`.
    ///
    /// An abandoned worker finishes on its own once the agent timeout fires.
    fn call_cancellable(&self, request: &HttpRequest, cancel: &CancelToken) -> Result<HttpResponse, ApiError> {
        cancel.check()?;
        let (tx, rx) = mpsc::channel();
        let transport = self.clone();
        let owned = request.clone();
        thread::spawn(move || {
            let _ = tx.send(transport.call(&owned));
        });

        loop {
            match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(result) => return result,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if let Err(err) = cancel.check() {
                        debug!(method = %request.method, "abandoning in-flight request");
                        return Err(err);
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(ApiError::Transport("transport worker exited".to_string()));
                }
            }
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest, cancel: Option<&CancelToken>) -> Result<HttpResponse, ApiError> {
        match cancel {
            Some(token) => self.call_cancellable(request, token),
            None => self.call(request),
        }
    }
}

fn transport_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Timeout(_) => ApiError::Timeout,
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => ApiError::Timeout,
        other => ApiError::Transport(other.to_string()),
    }
}
