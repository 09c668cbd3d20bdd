//! Metrics server capability.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::error::Error;
use crate::observability::metrics;
use crate::server::ready::ReadySignal;

const MODULE: &str = "metrics";

/// A small HTTP server that responds to `/metrics` with the Prometheus
/// exposition of the process-wide recorder.
pub struct MetricsServer {
    address: String,

    started: Mutex<bool>,
    bound: Mutex<Option<SocketAddr>>,

    ready: ReadySignal,
    shutdown: ReadySignal,
    finished: ReadySignal,
}

impl MetricsServer {
    /// Returns a `MetricsServer` configured with the given address.
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

    /// Binds the listener, signals readiness, and blocks until the server is
    /// stopped. A second `start` is an [`Error::AlreadyStarted`].
    pub async fn start(&self) -> Result<(), Error> {
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

        let handle = metrics::recorder_handle()?;
        let app = Router::new().route("/metrics", get(move || std::future::ready(handle.render())));

        tracing::info!(address = %local_addr, "starting Metrics server");

        let shutdown = self.shutdown.clone();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.wait().await;
        });

        self.ready.signal();
        let result = serve.await;
        self.finished.signal();

        tracing::info!("Metrics server stopped");
        result.map_err(|source| Error::Serve {
            module: MODULE,
            source: source.into(),
        })
    }

    /// Triggers graceful shutdown and waits for the serve loop to finish, up
    /// to the optional deadline. Idempotent; safe on a never-started
    /// instance.
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
