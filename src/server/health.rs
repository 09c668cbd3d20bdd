//! Healthcheck server capability.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;

use crate::error::Error;
use crate::observability::metrics;
use crate::server::ready::ReadySignal;

const MODULE: &str = "healthcheck";

type CheckFn = Box<dyn Fn() -> Result<(), String> + Send + Sync>;

#[derive(Default)]
struct Checks {
    liveness: Mutex<Vec<(String, CheckFn)>>,
    readiness: Mutex<Vec<(String, CheckFn)>>,
}

/// A small HTTP server with `/live` and `/ready` endpoints driven by
/// registered named checks. When constructed with `metrics: true` it also
/// exposes the process Prometheus registry through `/metrics`.
pub struct HealthServer {
    address: String,
    metrics: bool,
    checks: Arc<Checks>,

    started: Mutex<bool>,
    bound: Mutex<Option<SocketAddr>>,

    ready: ReadySignal,
    shutdown: ReadySignal,
    finished: ReadySignal,
}

impl HealthServer {
    /// Returns a `HealthServer` configured with the given address, optionally
    /// exposing `/metrics` too.
    pub fn new(address: impl Into<String>, metrics: bool) -> Self {
        Self {
            address: address.into(),
            metrics,
            checks: Arc::new(Checks::default()),
            started: Mutex::new(false),
            bound: Mutex::new(None),
            ready: ReadySignal::new(),
            shutdown: ReadySignal::new(),
            finished: ReadySignal::new(),
        }
    }

    /// Registers a named liveness check, reported by `/live`.
    pub fn add_liveness_check(
        &self,
        name: impl Into<String>,
        check: impl Fn() -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.checks
            .liveness
            .lock()
            .unwrap()
            .push((name.into(), Box::new(check)));
    }

    /// Registers a named readiness check, reported by `/ready`.
    pub fn add_readiness_check(
        &self,
        name: impl Into<String>,
        check: impl Fn() -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.checks
            .readiness
            .lock()
            .unwrap()
            .push((name.into(), Box::new(check)));
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

        let mut router = Router::new()
            .route("/live", get(live_handler))
            .route("/ready", get(ready_handler));

        if self.metrics {
            let handle = metrics::recorder_handle()?;
            router = router.route("/metrics", get(move || std::future::ready(handle.render())));
        }

        let app = router.with_state(self.checks.clone());

        tracing::info!(address = %local_addr, "starting Healthcheck server");

        let shutdown = self.shutdown.clone();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.wait().await;
        });

        self.ready.signal();
        let result = serve.await;
        self.finished.signal();

        tracing::info!("Healthcheck server stopped");
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

async fn live_handler(
    State(checks): State<Arc<Checks>>,
) -> (StatusCode, Json<BTreeMap<String, String>>) {
    run_checks(&checks.liveness)
}

async fn ready_handler(
    State(checks): State<Arc<Checks>>,
) -> (StatusCode, Json<BTreeMap<String, String>>) {
    run_checks(&checks.readiness)
}

fn run_checks(
    checks: &Mutex<Vec<(String, CheckFn)>>,
) -> (StatusCode, Json<BTreeMap<String, String>>) {
    let mut results = BTreeMap::new();
    let mut healthy = true;

    for (name, check) in checks.lock().unwrap().iter() {
        match check() {
            Ok(()) => {
                results.insert(name.clone(), "OK".to_string());
            }
            Err(reason) => {
                healthy = false;
                results.insert(name.clone(), reason);
            }
        }
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(results))
}
