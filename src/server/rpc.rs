//! gRPC server capability.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use http::{Request, Response};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::RoutesBuilder;
use tonic::transport::Server as TransportServer;
use tower::{Layer, Service};
use tower_http::classify::GrpcFailureClass;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::error::Error;
use crate::observability::metrics;
use crate::server::ready::ReadySignal;

const MODULE: &str = "grpc";

/// Registration callback passed to [`RpcServer::start`]. It exposes the
/// internal route builder so gRPC service implementations can attach
/// themselves before traffic starts.
pub type RpcRegisterFn = Box<dyn FnOnce(&mut RoutesBuilder) + Send>;

/// The gRPC server capability.
///
/// Configured with a listening address at construction; the listener and
/// transport are only created inside [`start`](RpcServer::start).
pub struct RpcServer {
    address: String,
    timeout: Option<Duration>,

    started: Mutex<bool>,
    bound: Mutex<Option<SocketAddr>>,

    ready: ReadySignal,
    shutdown: ReadySignal,
    finished: ReadySignal,
}

impl RpcServer {
    /// Returns an `RpcServer` set to listen at the given address.
    /// Port `0` means "any free port"; the resolved address is recorded and
    /// observable through [`local_addr`](RpcServer::local_addr) once started.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: None,
            started: Mutex::new(false),
            bound: Mutex::new(None),
            ready: ReadySignal::new(),
            shutdown: ReadySignal::new(),
            finished: ReadySignal::new(),
        }
    }

    /// Applies a per-request timeout to the transport.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Binds the listener, applies all registration callbacks, signals
    /// readiness, and blocks until the server is stopped.
    ///
    /// Returns `Ok(())` on graceful shutdown, an error on any other
    /// termination. Calling `start` on an already started instance is an
    /// [`Error::AlreadyStarted`].
    pub async fn start(&self, register_fns: Vec<RpcRegisterFn>) -> Result<(), Error> {
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

        let mut routes = RoutesBuilder::default();
        for register in register_fns {
            register(&mut routes);
        }

        tracing::info!(address = %local_addr, "starting gRPC server");

        let mut builder = TransportServer::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        // Request-scoped span carrying the gRPC method, plus start/finish
        // logging with elapsed duration and outcome.
        let trace = TraceLayer::new_for_grpc()
            .make_span_with(|request: &Request<_>| {
                tracing::info_span!("grpc_request", grpc_method = %request.uri().path())
            })
            .on_request(|_: &Request<_>, _: &Span| {
                tracing::debug!("request started");
            })
            .on_response(|response: &Response<_>, latency: Duration, _: &Span| {
                tracing::debug!(
                    status = response.status().as_u16(),
                    duration = ?latency,
                    "request finished"
                );
            })
            .on_failure(|class: GrpcFailureClass, latency: Duration, _: &Span| {
                tracing::warn!(class = %class, duration = ?latency, "request failed");
            });

        let middleware = tower::ServiceBuilder::new()
            .layer(trace)
            .layer(RequestMetricsLayer);

        let shutdown = self.shutdown.clone();
        let serve = builder
            .layer(middleware)
            .add_routes(routes.routes())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                shutdown.wait().await;
            });

        self.ready.signal();
        let result = serve.await;
        self.finished.signal();

        tracing::info!("gRPC server stopped");
        result.map_err(|source| Error::Serve {
            module: MODULE,
            source: source.into(),
        })
    }

    /// Triggers graceful shutdown (in-flight calls drain) and waits for the
    /// serve loop to finish, up to the optional deadline.
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

    /// A signal that fires once the server is bound and accepting calls.
    pub fn ready(&self) -> ReadySignal {
        self.ready.clone()
    }

    /// The concrete bound address, available once `start` has bound the
    /// listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock().unwrap()
    }
}

/// Records one request metric per call, labelled with the gRPC method path.
#[derive(Clone)]
struct RequestMetricsLayer;

impl<S> Layer<S> for RequestMetricsLayer {
    type Service = RequestMetrics<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestMetrics { inner }
    }
}

#[derive(Clone)]
struct RequestMetrics<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestMetrics<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let method = request.uri().path().to_string();
        let started = Instant::now();

        let future = self.inner.call(request);
        Box::pin(async move {
            let response = future.await?;
            metrics::record_request(
                MODULE,
                &method,
                response.status().as_u16(),
                started.elapsed(),
            );
            Ok(response)
        })
    }
}
