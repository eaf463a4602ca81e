//! Non-blocking HTTP engine with per-engine in-flight accounting.
//!
//! Every request is run on its own tokio task. The caller hands over a
//! completion handler which is invoked exactly once with the finished
//! [`Response`], whether the transport succeeded or not. The in-flight
//! counter is decremented only after that handler returns, so a handler
//! that submits a follow-up request keeps the engine busy until the whole
//! chain has completed. [`HttpEngine::drain`] waits for exactly that.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, Method};
use tokio::sync::Notify;
use tracing::{debug, info, warn, Instrument};
use url::Url;

use crate::error::LoadError;

/// Ordered form fields for a POST body.
pub type FormParams = Vec<(String, String)>;

// =============================================================================
// Request / Response
// =============================================================================

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    form: FormParams,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            form: Vec::new(),
        }
    }

    pub fn post(url: Url, form: FormParams) -> Self {
        Self {
            method: Method::POST,
            url,
            form,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn form(&self) -> &[(String, String)] {
        &self.form
    }
}

/// Final outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Code(u16),
    /// Connection error, timeout, or a body that could not be read.
    Failed,
}

impl Status {
    pub fn is_error(self) -> bool {
        match self {
            Status::Code(code) => (400..600).contains(&code),
            Status::Failed => true,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Code(code) => write!(f, "{code}"),
            Status::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    body: Vec<u8>,
    status: Option<Status>,
    started: Instant,
    finished: Option<Instant>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            body: Vec::new(),
            status: None,
            started: Instant::now(),
            finished: None,
        }
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    /// The body received so far, decoded as UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Marks the response complete. The end timestamp is taken here.
    pub fn set_status(&mut self, status: Status) {
        self.status = Some(status);
        self.finished = Some(Instant::now());
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.status.is_some_and(Status::is_error)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.finished.map(|end| end.duration_since(self.started))
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration().map(|d| d.as_millis() as u64)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// In-flight accounting
// =============================================================================

#[derive(Debug, Default)]
struct InFlight {
    pending: AtomicUsize,
    issued: AtomicU64,
    completed: AtomicU64,
    idle: Notify,
}

impl InFlight {
    fn register(&self) {
        self.issued.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn arrive(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking, or a wakeup between the
            // load and the await would be lost.
            notified.as_mut().enable();

            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one request as finished when dropped, including during unwinding.
struct Arrival(Arc<InFlight>);

impl Drop for Arrival {
    fn drop(&mut self) {
        self.0.arrive();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub pending: usize,
    pub issued: u64,
    pub completed: u64,
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Per-request transport timeout. Expiry surfaces as [`Status::Failed`].
    pub request_timeout: Option<Duration>,
    pub accept_invalid_certs: bool,
}

/// One engine per simulated user. Clones share the same client, cookie jar
/// and in-flight counter.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: Client,
    in_flight: Arc<InFlight>,
}

impl HttpEngine {
    pub fn start(settings: &EngineSettings) -> Result<Self, LoadError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .user_agent(concat!("portal-loadgen/", env!("CARGO_PKG_VERSION")));

        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(LoadError::Client)?;

        Ok(Self {
            client,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn get<F>(&self, url: Url, on_complete: F)
    where
        F: FnOnce(&Response) + Send + 'static,
    {
        self.submit(Request::get(url), on_complete);
    }

    pub fn post<F>(&self, url: Url, form: FormParams, on_complete: F)
    where
        F: FnOnce(&Response) + Send + 'static,
    {
        self.submit(Request::post(url, form), on_complete);
    }

    /// Sends `request` in the background and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F>(&self, request: Request, on_complete: F)
    where
        F: FnOnce(&Response) + Send + 'static,
    {
        self.in_flight.register();
        let arrival = Arrival(Arc::clone(&self.in_flight));
        let client = self.client.clone();

        tokio::spawn(
            async move {
                // Declared first so it drops last, after the handler has returned.
                let _arrival = arrival;
                let response = perform(&client, &request).await;
                info!(
                    "{} {} -> {} in {}ms",
                    request.method,
                    request.url,
                    response.status().unwrap_or(Status::Failed),
                    response.duration_ms().unwrap_or_default()
                );
                on_complete(&response);
            }
            .in_current_span(),
        );
    }

    /// Waits until every submitted request, including ones submitted from
    /// completion handlers, has run its handler.
    pub async fn drain(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Like [`drain`](Self::drain) but gives up after `limit`. Returns
    /// whether the engine went idle.
    pub async fn drain_within(&self, limit: Option<Duration>) -> bool {
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.drain()).await.is_ok(),
            None => {
                self.drain().await;
                true
            }
        }
    }

    pub fn status_snapshot(&self) -> EngineStatus {
        EngineStatus {
            pending: self.in_flight.pending.load(Ordering::SeqCst),
            issued: self.in_flight.issued.load(Ordering::SeqCst),
            completed: self.in_flight.completed.load(Ordering::SeqCst),
        }
    }

    /// Releases this handle on the connection pool.
    pub fn stop(self) {
        let status = self.status_snapshot();
        if status.pending > 0 {
            warn!(
                "Stopping engine with {} requests still pending ({} issued)",
                status.pending, status.issued
            );
        } else {
            debug!("Engine stopped after {} requests", status.completed);
        }
    }
}

async fn perform(client: &Client, request: &Request) -> Response {
    let mut response = Response::new();

    let mut builder = client.request(request.method.clone(), request.url.clone());
    if !request.form.is_empty() {
        builder = builder.form(&request.form);
    }

    let mut reply = match builder.send().await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("{} {} failed: {}", request.method, request.url, e);
            response.set_status(Status::Failed);
            return response;
        }
    };

    let code = reply.status().as_u16();
    loop {
        match reply.chunk().await {
            Ok(Some(chunk)) => response.append(&chunk),
            Ok(None) => break,
            Err(e) => {
                warn!(
                    "{} {} failed while reading body: {}",
                    request.method, request.url, e
                );
                response.set_status(Status::Failed);
                return response;
            }
        }
    }

    response.set_status(Status::Code(code));
    response
}
