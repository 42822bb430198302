//! Delivery server
//!
//! A loopback HTTP listener that hands out the rendered document once.
//!
//! Lifecycle:
//!   Created -> Listening -> Served -> ExplicitlyClosed | TimedOut
//!   Created -> Listening -> ExplicitlyClosed | TimedOut
//!
//! Routes (both gated by the delivery token):
//!   GET  /{token}/print   the document, first authenticated request only
//!   POST /{token}/close   release the listener
//!
//! Anything else, including a wrong token, gets a plain 404 and leaves the
//! server untouched.
//!
//! The document counts as delivered only once its body has been handed to the
//! connection in full. A client that goes away mid-response gives the
//! delivery back, so a retry still gets the page.

use std::convert::Infallible;
use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures::stream;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::render::RenderedDocument;
use crate::token::DeliveryToken;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Where the server is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    Served,
    ExplicitlyClosed,
    TimedOut,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Listening => "listening",
            Self::Served => "served",
            Self::ExplicitlyClosed => "closed",
            Self::TimedOut => "timed out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExplicitlyClosed | Self::TimedOut)
    }
}

/// Why the listener was released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Closed,
    TimedOut,
}

impl From<ShutdownReason> for ServerState {
    fn from(reason: ShutdownReason) -> Self {
        match reason {
            ShutdownReason::Closed => Self::ExplicitlyClosed,
            ShutdownReason::TimedOut => Self::TimedOut,
        }
    }
}

/// A server holding its document and token, not yet bound
pub struct DeliveryServer {
    token: DeliveryToken,
    document: RenderedDocument,
}

impl DeliveryServer {
    pub fn new(document: RenderedDocument) -> Self {
        Self::with_token(document, DeliveryToken::generate())
    }

    pub fn with_token(document: RenderedDocument, token: DeliveryToken) -> Self {
        Self { token, document }
    }

    pub fn state(&self) -> ServerState {
        ServerState::Created
    }

    /// Bind a loopback listener on an OS-assigned port
    pub async fn bind(self) -> Result<ListeningServer, ServerError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(addr = %local_addr, "listening");

        let (shutdown, _) = watch::channel(None);
        Ok(ListeningServer {
            listener,
            addr: local_addr,
            handle: ServerHandle {
                inner: Arc::new(Shared {
                    token: self.token,
                    document: self.document,
                    delivery: AtomicU8::new(AVAILABLE),
                    shutdown,
                }),
            },
            ready: None,
            drain: DEFAULT_DRAIN,
        })
    }
}

/// How long in-flight requests may run after the listener is released
pub const DEFAULT_DRAIN: Duration = Duration::from_secs(2);

/// A bound server, ready to accept connections
pub struct ListeningServer {
    listener: TcpListener,
    addr: SocketAddr,
    handle: ServerHandle,
    ready: Option<oneshot::Sender<()>>,
    drain: Duration,
}

impl ListeningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Full URL of the document, token included
    pub fn url(&self) -> String {
        format!("http://{}/{}/print", self.addr, self.handle.inner.token.as_str())
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn with_drain(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    /// Fires once the listener is bound and serving is about to start
    pub fn ready_signal(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.ready = Some(tx);
        rx
    }

    /// Accept connections until the server is closed or times out
    pub async fn serve(self) -> Result<ShutdownReason, ServerError> {
        let handle = self.handle.clone();
        let app = router(handle.clone());

        let signal = {
            let handle = handle.clone();
            async move {
                let reason = handle.closed().await;
                info!(reason = ?reason, "releasing listener");
            }
        };
        let server = axum::serve(self.listener, app)
            .with_graceful_shutdown(signal)
            .into_future();

        if let Some(ready) = self.ready {
            let _ = ready.send(());
        }

        let drain = self.drain;
        tokio::select! {
            result = server => result.map_err(ServerError::Serve)?,
            _ = async {
                handle.closed().await;
                tokio::time::sleep(drain).await;
            } => {
                warn!("requests still open after {:?}, abandoning them", drain);
            }
        }

        Ok(handle.finish())
    }
}

/// Shared view of a running server; cheap to clone
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Shared>,
}

struct Shared {
    token: DeliveryToken,
    document: RenderedDocument,
    delivery: AtomicU8,
    shutdown: watch::Sender<Option<ShutdownReason>>,
}

// Delivery progress
const AVAILABLE: u8 = 0;
const SENDING: u8 = 1;
const DELIVERED: u8 = 2;

impl ServerHandle {
    pub fn state(&self) -> ServerState {
        match *self.inner.shutdown.borrow() {
            Some(reason) => reason.into(),
            None if self.inner.delivery.load(Ordering::SeqCst) == DELIVERED => {
                ServerState::Served
            }
            None => ServerState::Listening,
        }
    }

    /// Release the listener. Safe to call any number of times from any task;
    /// only the first call decides the reason. Returns whether this call did.
    pub fn close(&self, reason: ShutdownReason) -> bool {
        self.inner.shutdown.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.inner.shutdown.borrow()
    }

    /// Wait until the server has been closed
    pub async fn closed(&self) -> ShutdownReason {
        let mut rx = self.inner.shutdown.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives in `self`, so this only fails if it is gone.
            if rx.changed().await.is_err() {
                return ShutdownReason::Closed;
            }
        }
    }

    /// Close the server with `TimedOut` once `deadline` passes, unless it is
    /// closed first
    pub fn watch_deadline(&self, deadline: Instant) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if handle.close(ShutdownReason::TimedOut) {
                        info!("deadline reached");
                    }
                }
                _ = handle.closed() => {}
            }
        })
    }

    fn finish(&self) -> ShutdownReason {
        self.close(ShutdownReason::Closed);
        self.reason().unwrap_or(ShutdownReason::Closed)
    }

    fn authorize(&self, token: Result<Path<String>, PathRejection>) -> bool {
        match token {
            Ok(Path(token)) => self.inner.token.matches(&token),
            Err(e) => {
                debug!("unreadable token: {}", e);
                false
            }
        }
    }
}

fn router(handle: ServerHandle) -> Router {
    Router::new()
        .route("/{token}/print", get(print_handler))
        .route("/{token}/close", post(close_handler))
        .fallback(not_found)
        .with_state(handle)
}

async fn print_handler(
    State(handle): State<ServerHandle>,
    token: Result<Path<String>, PathRejection>,
) -> Response {
    if !handle.authorize(token) {
        warn!("print request with invalid token");
        return not_found().await;
    }
    if handle.reason().is_some() {
        return not_found().await;
    }
    let Some(claim) = DeliveryClaim::acquire(&handle) else {
        warn!("document already delivered or in flight, refusing request");
        return not_found().await;
    };

    let body = handle.inner.document.body();
    debug!(bytes = body.len(), "sending document");

    (
        [
            (header::CONTENT_TYPE, RenderedDocument::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Body::from_stream(transfer(claim, body)),
    )
        .into_response()
}

/// Exclusive right to send the document. Dropped unfinished, it makes the
/// document available again.
struct DeliveryClaim {
    handle: ServerHandle,
    finished: bool,
}

impl DeliveryClaim {
    fn acquire(handle: &ServerHandle) -> Option<Self> {
        handle
            .inner
            .delivery
            .compare_exchange(AVAILABLE, SENDING, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(Self {
            handle: handle.clone(),
            finished: false,
        })
    }

    fn finish(mut self) {
        self.handle.inner.delivery.store(DELIVERED, Ordering::SeqCst);
        self.finished = true;
        info!(bytes = self.handle.inner.document.len(), "document delivered");
    }
}

impl Drop for DeliveryClaim {
    fn drop(&mut self) {
        if !self.finished {
            self.handle.inner.delivery.store(AVAILABLE, Ordering::SeqCst);
            warn!("document transfer interrupted, delivery released");
        }
    }
}

enum Transfer {
    Pending(DeliveryClaim, Bytes),
    Sent(DeliveryClaim),
}

/// One chunk carrying the whole document. The claim is finished when the
/// connection asks for more after that chunk.
fn transfer(
    claim: DeliveryClaim,
    body: Bytes,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::unfold(Transfer::Pending(claim, body), |transfer| async move {
        match transfer {
            Transfer::Pending(claim, body) => {
                Some((Ok::<_, Infallible>(body), Transfer::Sent(claim)))
            }
            Transfer::Sent(claim) => {
                claim.finish();
                None
            }
        }
    })
}

async fn close_handler(
    State(handle): State<ServerHandle>,
    token: Result<Path<String>, PathRejection>,
) -> Response {
    if !handle.authorize(token) {
        warn!("close request with invalid token");
        return not_found().await;
    }

    if handle.close(ShutdownReason::Closed) {
        info!("close requested");
    }
    StatusCode::OK.into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn listening() -> ListeningServer {
        DeliveryServer::new(RenderedDocument::from("<p>doc</p>".to_string()))
            .bind()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_loopback() {
        let server = listening().await;
        let addr = server.local_addr();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert_eq!(server.handle().state(), ServerState::Listening);
    }

    #[tokio::test]
    async fn test_url_contains_token() {
        let token = DeliveryToken::generate();
        let server = DeliveryServer::with_token(RenderedDocument::from(String::new()), token.clone());
        assert_eq!(server.state(), ServerState::Created);

        let server = server.bind().await.unwrap();
        assert_eq!(
            server.url(),
            format!("http://{}/{}/print", server.local_addr(), token.as_str())
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let server = listening().await;
        let handle = server.handle();

        assert!(handle.close(ShutdownReason::Closed));
        assert!(!handle.close(ShutdownReason::Closed));
        assert!(!handle.close(ShutdownReason::TimedOut));

        assert_eq!(handle.state(), ServerState::ExplicitlyClosed);
        assert_eq!(handle.closed().await, ShutdownReason::Closed);
    }

    #[tokio::test]
    async fn test_deadline_closes() {
        let server = listening().await;
        let handle = server.handle();

        let watcher = handle.watch_deadline(Instant::now() + Duration::from_millis(20));
        watcher.await.unwrap();

        assert_eq!(handle.state(), ServerState::TimedOut);
    }

    #[tokio::test]
    async fn test_deadline_after_close_is_noop() {
        let server = listening().await;
        let handle = server.handle();

        let watcher = handle.watch_deadline(Instant::now() + Duration::from_secs(60));
        handle.close(ShutdownReason::Closed);
        watcher.await.unwrap();

        assert_eq!(handle.state(), ServerState::ExplicitlyClosed);
    }

    #[tokio::test]
    async fn test_serve_returns_after_close() {
        let mut server = listening().await;
        let ready = server.ready_signal();
        let handle = server.handle();

        let task = tokio::spawn(server.serve());
        ready.await.unwrap();
        handle.close(ShutdownReason::Closed);

        let reason = task.await.unwrap().unwrap();
        assert_eq!(reason, ShutdownReason::Closed);
    }

    async fn request_print(handle: &ServerHandle, token: &DeliveryToken) -> Response {
        print_handler(State(handle.clone()), Ok(Path(token.as_str().to_string()))).await
    }

    #[tokio::test]
    async fn test_interrupted_transfer_releases_delivery() {
        let token = DeliveryToken::generate();
        let document = RenderedDocument::from("<p>doc</p>".to_string());
        let server = DeliveryServer::with_token(document, token.clone())
            .bind()
            .await
            .unwrap();
        let handle = server.handle();

        let resp = request_print(&handle, &token).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // A second request while the first is still sending is refused
        let busy = request_print(&handle, &token).await;
        assert_eq!(busy.status(), StatusCode::NOT_FOUND);

        // Client went away before the body was read
        drop(resp);
        assert_eq!(handle.state(), ServerState::Listening);

        let resp = request_print(&handle, &token).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<p>doc</p>");
        assert_eq!(handle.state(), ServerState::Served);

        let again = request_print(&handle, &token).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
        assert_eq!(handle.state(), ServerState::Served);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ServerState::ExplicitlyClosed.is_terminal());
        assert!(ServerState::TimedOut.is_terminal());
        assert!(!ServerState::Served.is_terminal());
        assert!(!ServerState::Listening.is_terminal());
    }
}
