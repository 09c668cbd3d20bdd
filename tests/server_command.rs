//! Capability composition and orchestration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use servicekit::error::Error;
use servicekit::server::{worker, RpcServer, WorkerPool};
use servicekit::{HasRpc, HasWorker, Server, ServerCommand};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

mod common;

/// A host supporting only the {RPC, Worker} capabilities.
#[derive(Default)]
struct Modules {
    rpc: Mutex<Option<Arc<RpcServer>>>,
    worker: Mutex<Option<Arc<WorkerPool>>>,
}

struct RpcWorkerService {
    modules: Arc<Modules>,
}

impl HasRpc for RpcWorkerService {
    fn configure_rpc(&mut self, rpc: Arc<RpcServer>) {
        *self.modules.rpc.lock().unwrap() = Some(rpc);
    }
}

impl HasWorker for RpcWorkerService {
    fn configure_worker(&mut self, worker: Arc<WorkerPool>) {
        *self.modules.worker.lock().unwrap() = Some(worker);
    }
}

#[async_trait]
impl Server for RpcWorkerService {
    async fn start(&self) -> Result<(), Error> {
        let rpc = self.modules.rpc.lock().unwrap().clone().expect("rpc not configured");
        let worker = self
            .modules
            .worker
            .lock()
            .unwrap()
            .clone()
            .expect("worker not configured");

        let heartbeat = worker::task(|cancel| async move {
            cancel.cancelled().await;
            Ok(())
        });

        let (rpc_result, worker_result) =
            tokio::join!(rpc.start(Vec::new()), worker.start(vec![heartbeat]));
        rpc_result?;
        worker_result?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        let rpc = self.modules.rpc.lock().unwrap().clone();
        if let Some(rpc) = rpc {
            rpc.stop(None).await?;
        }
        let worker = self.modules.worker.lock().unwrap().clone();
        if let Some(worker) = worker {
            worker.stop();
        }
        Ok(())
    }
}

fn rpc_worker_command(
    modules: Arc<Modules>,
    shutdown: CancellationToken,
) -> ServerCommand<RpcWorkerService> {
    ServerCommand::new("testsvc", RpcWorkerService { modules })
        .with_shutdown(shutdown)
        .with_rpc()
        .with_worker()
}

#[test]
fn only_enabled_capabilities_expose_flags() {
    let command = rpc_worker_command(Arc::default(), CancellationToken::new()).command();

    let server = command
        .get_subcommands()
        .find(|sub| sub.get_name() == "server")
        .expect("server subcommand missing");

    let flags: Vec<&str> = server
        .get_arguments()
        .map(|arg| arg.get_id().as_str())
        .collect();

    assert!(flags.contains(&"grpc-address"));
    assert!(!flags.contains(&"http-address"));
    assert!(!flags.contains(&"metrics-address"));
    assert!(!flags.contains(&"healthcheck-address"));
    assert!(!flags.contains(&"db-env-prefix"));
    assert!(!flags.contains(&"reader-db-env-prefix"));

    // No migrations were enabled either.
    assert!(!command
        .get_subcommands()
        .any(|sub| sub.get_name() == "migrate"));
}

#[test]
fn configuration_hooks_of_absent_capabilities_are_never_called() {
    // The composition is checked at compile time: RpcWorkerService does not
    // implement HasHttp, so `.with_http()` would not compile. At runtime the
    // only observable effect of an absent capability is that its module is
    // never constructed.
    let modules = Arc::default();
    let _ = rpc_worker_command(Arc::clone(&modules), CancellationToken::new());
    assert!(modules.rpc.lock().unwrap().is_none());
    assert!(modules.worker.lock().unwrap().is_none());
}

#[tokio::test]
async fn server_subcommand_configures_starts_and_stops_the_host() {
    let modules: Arc<Modules> = Arc::default();
    let shutdown = CancellationToken::new();

    let command = rpc_worker_command(Arc::clone(&modules), shutdown.clone());
    let run = tokio::spawn(command.execute_from(["testsvc", "server"]));

    // Configure phase installed both modules.
    let probe = Arc::clone(&modules);
    common::eventually(
        move || probe.rpc.lock().unwrap().is_some() && probe.worker.lock().unwrap().is_some(),
        Duration::from_millis(500),
        Duration::from_millis(5),
        "capabilities were not configured",
    )
    .await;

    let rpc = modules.rpc.lock().unwrap().clone().unwrap();
    let pool = modules.worker.lock().unwrap().clone().unwrap();
    rpc.ready().wait().await;
    pool.ready().wait().await;

    let addr = rpc.local_addr().expect("rpc address not recorded");
    assert!(TcpStream::connect(addr).await.is_ok());

    // An external stop request fans out through the host's stop.
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("run did not finish after shutdown")
        .unwrap()
        .unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn migrate_rejects_a_missing_migrations_directory() {
    let command = rpc_worker_command(Arc::default(), CancellationToken::new()).with_migrations();

    let err = command
        .execute_from(["testsvc", "migrate", "--path", "/definitely/not/here"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Migration(_)));
}

#[tokio::test]
async fn unknown_flags_for_disabled_capabilities_fail_parsing() {
    let command = rpc_worker_command(Arc::default(), CancellationToken::new());

    let err = command
        .execute_from(["testsvc", "server", "--http-address", "localhost:0"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cli(_)));
}
