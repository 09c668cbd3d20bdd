//! HTTP server capability.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::error::Error;
use crate::observability::metrics;
use crate::server::ready::ReadySignal;

const MODULE: &str = "http";

/// Registration callback passed to [`HttpServer::start`]. It exposes the
/// internal router so endpoints can be registered before traffic starts.
pub type HttpRegisterFn = Box<dyn FnOnce(Router) -> Router + Send>;

/// The HTTP server capability.
///
/// Routes are attached through registration callbacks during
/// [`start`](HttpServer::start); the module owns the listener, the middleware
/// chain (request id, tracing, request metrics) and the graceful shutdown
/// path.
pub struct HttpServer {
    address: String,

    started: Mutex<bool>,
    bound: Mutex<Option<SocketAddr>>,

    ready: ReadySignal,
    shutdown: ReadySignal,
    finished: ReadySignal,
}

impl HttpServer {
    /// Returns an `HttpServer` configured with the given address.
    /// Port `0` means "any free port"; the resolved address is observable
    /// through [`local_addr`](HttpServer::local_addr) once started.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            started: Mutex::new(false),
            bound: Mutex::new(None),
            ready: ReadySignal::new(),
            shutdown: ReadySignal::new(),
            finished: ReadySignal::new(),
        }
    }

    /// Registers all callbacks against a fresh router, binds the listener,
    /// signals readiness, and blocks until the server shuts down.
    ///
    /// Returns `Ok(())` on graceful shutdown, an error on any other
    /// termination. A second `start` on the same instance is an
    /// [`Error::AlreadyStarted`].
    pub async fn start(&self, register_fns: Vec<HttpRegisterFn>) -> Result<(), Error> {
        {
            let mut started = self.started.lock().unwrap();
            if *started {
                return Err(Error::AlreadyStarted { module: MODULE });
            }
            *started = true;
        }

        let listener = match TcpListener::bind(&self.address).await {
            Ok(listener) => listener,
            Err(source) => {
                self.finished.signal();
                return Err(Error::Bind {
                    address: self.address.clone(),
                    source,
                });
            }
        };

        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(source) => {
                self.finished.signal();
                return Err(Error::Bind {
                    address: self.address.clone(),
                    source,
                });
            }
        };
        *self.bound.lock().unwrap() = Some(local_addr);

        let mut router = Router::new();
        for register in register_fns {
            router = register(router);
        }

        // Middleware, innermost first: metrics, request-scoped span with
        // start/finish logging, then request id injection/propagation so the
        // span can pick the id up.
        let app = router
            .layer(axum::middleware::from_fn(record_request_metrics))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &http::Request<_>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id,
                        )
                    })
                    .on_request(|_: &http::Request<_>, _: &Span| {
                        tracing::debug!("request started");
                    })
                    .on_response(|response: &http::Response<_>, latency: Duration, _: &Span| {
                        tracing::debug!(
                            status = response.status().as_u16(),
                            duration = ?latency,
                            "request finished"
                        );
                    })
                    .on_failure(
                        |class: ServerErrorsFailureClass, latency: Duration, _: &Span| {
                            tracing::warn!(class = %class, duration = ?latency, "request failed");
                        },
                    ),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        tracing::info!(address = %local_addr, "starting HTTP server");

        let shutdown = self.shutdown.clone();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.wait().await;
        });

        self.ready.signal();
        let result = serve.await;
        self.finished.signal();

        tracing::info!("HTTP server stopped");
        result.map_err(|source| Error::Serve {
            module: MODULE,
            source: source.into(),
        })
    }

    /// Triggers graceful shutdown and waits for in-flight requests to drain,
    /// up to the optional deadline ([`Error::ShutdownTimeout`] when
    /// exceeded). The listener stops accepting as soon as the trigger fires.
    ///
    /// Safe to call while `start` is still binding, on an instance that never
    /// started, and more than once.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<(), Error> {
        self.shutdown.signal();

        if !*self.started.lock().unwrap() {
            return Ok(());
        }

        match timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.finished.wait())
                .await
                .map_err(|_| Error::ShutdownTimeout { module: MODULE }),
            None => {
                self.finished.wait().await;
                Ok(())
            }
        }
    }

    /// A signal that fires once the server is bound and accepting requests.
    pub fn ready(&self) -> ReadySignal {
        self.ready.clone()
    }

    /// The concrete bound address, available once `start` has bound the
    /// listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock().unwrap()
    }
}

async fn record_request_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::record_request(
        MODULE,
        &method,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}
