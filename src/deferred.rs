//! Deferred server.
//!
//! A [`DeferredServer`] is handed out before the blog has finished starting.
//! Requests that arrive while initialization is still running are queued in
//! arrival order; once the real router has been assembled they are replayed
//! through it one by one, and every later request goes straight to it.
//!
//! ```text
//! Initializing --init ok--> Ready
//!      |
//!      +-------init err---> Failed
//! ```
//!
//! The queue is unbounded. Without `buffer_timeout` a request waits for as
//! long as initialization takes; with it, the request is answered `503` after
//! the timeout and skipped on replay. If initialization fails, queued and later
//! requests are answered `503`.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tower::{Service, ServiceExt};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::gate::{InitError, InitFuture};
use crate::middleware::{MountCell, MountPoint};

/// The real handler, available once initialization has finished.
#[derive(Clone)]
pub struct Assembled {
    pub router: Router,
    /// Mount point the router's path rewriter reads
    pub mount: MountCell,
}

/// Tuning for the startup buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredOptions {
    /// Answer buffered requests with 503 after waiting this long
    pub buffer_timeout: Option<Duration>,
}

impl DeferredOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            buffer_timeout: config.startup.buffer_timeout_seconds.map(Duration::from_secs),
        }
    }
}

/// Lifecycle phase of a deferred server.
#[derive(Debug, Clone)]
pub enum Phase {
    Initializing,
    Ready,
    Failed(Arc<InitError>),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StartupError {
    #[error("Initialization failed: {0}")]
    Init(Arc<InitError>),

    #[error("Startup task ended without reporting a result")]
    Abandoned,
}

/// Completion signal of a deferred server's startup.
#[derive(Debug, Clone)]
pub struct Startup {
    phase: watch::Receiver<Phase>,
}

impl Startup {
    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    /// Wait until startup has either completed or failed.
    pub async fn wait(mut self) -> Result<(), StartupError> {
        let phase = self
            .phase
            .wait_for(|phase| !matches!(phase, Phase::Initializing))
            .await
            .map_err(|_| StartupError::Abandoned)?
            .clone();

        match phase {
            Phase::Ready => Ok(()),
            Phase::Failed(err) => Err(StartupError::Init(err)),
            Phase::Initializing => Err(StartupError::Abandoned),
        }
    }
}

struct Buffered {
    request: Request,
    respond: oneshot::Sender<Response>,
}

enum State {
    Initializing(VecDeque<Buffered>),
    Ready(Assembled),
    Failed(Arc<InitError>),
}

struct Inner {
    state: Mutex<State>,
    phase: watch::Sender<Phase>,
    /// Mount point recorded on the façade by the host
    mount: MountCell,
    options: DeferredOptions,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        // Every transition leaves the state consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Request handler that holds requests back until the blog is ready.
#[derive(Clone)]
pub struct DeferredServer {
    inner: Arc<Inner>,
}

impl DeferredServer {
    /// Start driving `init` and return the handler immediately.
    ///
    /// `assemble` builds the real router from the initialized configuration.
    /// Must be called from within a Tokio runtime.
    pub fn spawn<A>(init: InitFuture, assemble: A, options: DeferredOptions) -> Self
    where
        A: FnOnce(Arc<AppConfig>) -> Result<Assembled, InitError> + Send + 'static,
    {
        let (phase, _) = watch::channel(Phase::Initializing);
        let server = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Initializing(VecDeque::new())),
                phase,
                mount: MountCell::default(),
                options,
            }),
        };

        tokio::spawn(drive(server.inner.clone(), init, assemble));
        server
    }

    /// Completion signal, for callers that want to know when startup is done.
    pub fn startup(&self) -> Startup {
        Startup {
            phase: self.inner.phase.subscribe(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase.borrow().clone()
    }

    /// Number of requests waiting for startup to finish.
    pub fn buffered(&self) -> usize {
        match &*self.inner.state() {
            State::Initializing(buffer) => buffer.len(),
            _ => 0,
        }
    }

    pub fn mount(&self) -> MountPoint {
        self.inner.mount.get()
    }

    /// Record where the host attached this server.
    ///
    /// Before startup completes the value is kept on the façade and copied to
    /// the real router before any buffered request is replayed.
    pub fn mount_at(&self, path: &str, parent: Option<&str>) {
        let mount = MountPoint {
            path: path.to_string(),
            parent: parent.map(str::to_string),
        };

        let state = self.inner.state();
        self.inner.mount.set(mount.clone());
        if let State::Ready(app) = &*state {
            app.mount.set(mount);
        }
    }

    /// Nest this server into `host` at `path`, recording the mount point.
    pub fn nest_into(self, host: Router, path: &str) -> Router {
        self.mount_at(path, None);
        host.nest_service(path, self)
    }

    /// Handle one request.
    ///
    /// While initializing the request is queued before this returns; the
    /// returned future resolves once it has been replayed.
    pub fn dispatch(&self, request: Request) -> BoxFuture<'static, Response> {
        let mut state = self.inner.state();
        match &mut *state {
            State::Ready(app) => {
                let router = app.router.clone();
                drop(state);
                forward(router, request).boxed()
            }
            State::Failed(err) => {
                let err = err.clone();
                drop(state);
                async move { unavailable(&err) }.boxed()
            }
            State::Initializing(buffer) => {
                let (respond, response) = oneshot::channel();
                buffer.push_back(Buffered { request, respond });
                tracing::debug!(buffered = buffer.len(), "Request buffered until startup completes");
                drop(state);
                await_replay(response, self.inner.options.buffer_timeout).boxed()
            }
        }
    }
}

impl Service<Request> for DeferredServer {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.dispatch(request).map(Ok).boxed()
    }
}

async fn forward(router: Router, request: Request) -> Response {
    router
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {})
}

async fn await_replay(response: oneshot::Receiver<Response>, timeout: Option<Duration>) -> Response {
    let replayed = match timeout {
        Some(limit) => match tokio::time::timeout(limit, response).await {
            Ok(replayed) => replayed,
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Buffered request timed out before startup completed");
                return AppError::Starting.into_response();
            }
        },
        None => response.await,
    };

    replayed.unwrap_or_else(|_| AppError::Starting.into_response())
}

/// Forward a buffered request on its own task; a panicking handler yields 500
/// and the drain carries on.
async fn replay(router: Router, request: Request) -> Response {
    let path = request.uri().path().to_string();
    match tokio::spawn(forward(router, request)).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(path = %path, error = %err, "Replayed request handler failed");
            AppError::Internal(format!("replay of {} failed", path)).into_response()
        }
    }
}

fn unavailable(err: &InitError) -> Response {
    AppError::StartupFailed(err.to_string()).into_response()
}

/// Wait for initialization, then replay the buffer and switch to `Ready`.
async fn drive<A>(inner: Arc<Inner>, init: InitFuture, assemble: A)
where
    A: FnOnce(Arc<AppConfig>) -> Result<Assembled, InitError>,
{
    let outcome = match init.await {
        Ok(config) => assemble(config),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(app) => become_ready(&inner, app).await,
        Err(err) => fail(&inner, Arc::new(err)),
    }
}

async fn become_ready(inner: &Inner, app: Assembled) {
    let mount = inner.mount.get();
    app.mount.set(mount.clone());
    tracing::debug!(path = %mount.path, parent = ?mount.parent, "Mount point copied to blog router");

    let router = app.router.clone();
    let mut app = Some(app);
    let mut replayed = 0usize;

    loop {
        let next = {
            let mut state = inner.state();
            match &mut *state {
                State::Initializing(buffer) => match buffer.pop_front() {
                    Some(buffered) => Some(buffered),
                    None => {
                        if let Some(app) = app.take() {
                            // Pick up a mount point recorded while replaying
                            app.mount.set(inner.mount.get());
                            *state = State::Ready(app);
                        }
                        None
                    }
                },
                State::Ready(_) | State::Failed(_) => None,
            }
        };

        let Some(buffered) = next else { break };
        if buffered.respond.is_closed() {
            tracing::debug!("Skipping buffered request abandoned by its client");
            continue;
        }

        let response = replay(router.clone(), buffered.request).await;
        let _ = buffered.respond.send(response);
        replayed += 1;
    }

    inner.phase.send_replace(Phase::Ready);
    tracing::info!(replayed, "Blog ready");
}

fn fail(inner: &Inner, err: Arc<InitError>) {
    tracing::error!(error = %err, "Blog failed to start");

    let pending = {
        let mut state = inner.state();
        match std::mem::replace(&mut *state, State::Failed(err.clone())) {
            State::Initializing(buffer) => buffer,
            State::Ready(_) | State::Failed(_) => VecDeque::new(),
        }
    };
    for buffered in pending {
        let _ = buffered.respond.send(unavailable(&err));
    }

    inner.phase.send_replace(Phase::Failed(err));
}
