//! Capability composition and lifecycle orchestration.
//!
//! A host declares its capabilities by implementing the one-method `Has*`
//! traits, and enables them explicitly on [`ServerCommand`]; each `with_*`
//! builder method carries the matching trait bound, so composition is
//! checked at compile time and a capability that is not enabled exposes no
//! CLI flag and has its hook never invoked.
//!
//! # Data Flow
//! ```text
//! ServerCommand::new(service)
//!     .with_rpc().with_worker()...     compile-time capability set
//!         │
//!         ▼  execute()
//!     configure phase                  sequential, deterministic; database
//!         │                            capabilities probe and must succeed
//!         ▼
//!     watcher task                     SIGTERM / SIGINT / shutdown token
//!         │                            └──▶ service.stop()
//!         ▼
//!     service.start()                  blocks on the calling task
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::database;
use crate::error::Error;
use crate::server::{
    Database, HealthServer, HttpServer, MetricsServer, ReaderDatabase, RpcServer, WorkerPool,
};

/// The primary capability: the only two operations the orchestrator drives.
///
/// Fanning `start`/`stop` out to the sub-servers built during the configure
/// phase is the host's responsibility, not the orchestrator's.
#[async_trait]
pub trait Server: Send + Sync + 'static {
    /// Starts the service and blocks until it is stopped.
    async fn start(&self) -> Result<(), Error>;

    /// Gracefully stops the service, causing `start` to return.
    async fn stop(&self) -> Result<(), Error>;
}

/// The host supports gRPC serving.
pub trait HasRpc {
    fn configure_rpc(&mut self, rpc: Arc<RpcServer>);
}

/// The host supports HTTP serving.
pub trait HasHttp {
    fn configure_http(&mut self, http: Arc<HttpServer>);
}

/// The host supports background worker tasks.
pub trait HasWorker {
    fn configure_worker(&mut self, worker: Arc<WorkerPool>);
}

/// The host supports a metrics endpoint.
pub trait HasMetrics {
    fn configure_metrics(&mut self, metrics: Arc<MetricsServer>);
}

/// The host supports a healthcheck endpoint.
pub trait HasHealthcheck {
    fn configure_healthcheck(&mut self, healthcheck: Arc<HealthServer>);
}

/// The host supports database access.
pub trait HasDatabase {
    fn configure_database(&mut self, db: Database);
}

/// The host supports a second, read-oriented database connection.
pub trait HasReaderDatabase {
    fn configure_reader_database(&mut self, db: ReaderDatabase);
}

type ConfigureFn<S> =
    Box<dyn for<'a> FnOnce(&'a mut S, &'a ArgMatches) -> BoxFuture<'a, Result<(), Error>> + Send>;

/// Builds and runs the `server` command for a host service, with exactly the
/// flags and configuration steps of its enabled capabilities.
pub struct ServerCommand<S> {
    name: String,
    service: S,
    shutdown: CancellationToken,

    server_args: Vec<Arg>,
    configure: Vec<ConfigureFn<S>>,
    migrations: bool,
}

impl<S: Server> ServerCommand<S> {
    /// Creates a command for the given service with no capabilities enabled.
    pub fn new(name: impl Into<String>, service: S) -> Self {
        Self {
            name: name.into(),
            service,
            shutdown: CancellationToken::new(),
            server_args: Vec::new(),
            configure: Vec::new(),
            migrations: false,
        }
    }

    /// Installs an external shutdown trigger. Cancelling the token stops the
    /// service exactly like a termination signal would.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Enables the gRPC capability and its `--grpc-address` flag.
    pub fn with_rpc(mut self) -> Self
    where
        S: HasRpc,
    {
        self.server_args.push(
            Arg::new("grpc-address")
                .long("grpc-address")
                .value_name("ADDRESS")
                .default_value("localhost:0")
                .help("listening address for gRPC connections"),
        );
        self.configure.push(Box::new(|service, matches| {
            Box::pin(async move {
                let address = string_flag(matches, "grpc-address");
                service.configure_rpc(Arc::new(RpcServer::new(address)));
                Ok(())
            })
        }));
        self
    }

    /// Enables the HTTP capability and its `--http-address` flag.
    pub fn with_http(mut self) -> Self
    where
        S: HasHttp,
    {
        self.server_args.push(
            Arg::new("http-address")
                .long("http-address")
                .value_name("ADDRESS")
                .default_value("localhost:0")
                .help("listening address for HTTP connections"),
        );
        self.configure.push(Box::new(|service, matches| {
            Box::pin(async move {
                let address = string_flag(matches, "http-address");
                service.configure_http(Arc::new(HttpServer::new(address)));
                Ok(())
            })
        }));
        self
    }

    /// Enables the worker capability. Workers need no flags.
    pub fn with_worker(mut self) -> Self
    where
        S: HasWorker,
    {
        self.configure.push(Box::new(|service, _| {
            Box::pin(async move {
                service.configure_worker(Arc::new(WorkerPool::new()));
                Ok(())
            })
        }));
        self
    }

    /// Enables the metrics capability and its `--metrics-address` flag.
    pub fn with_metrics(mut self) -> Self
    where
        S: HasMetrics,
    {
        self.server_args.push(
            Arg::new("metrics-address")
                .long("metrics-address")
                .value_name("ADDRESS")
                .default_value("localhost:0")
                .help("listening address for metrics"),
        );
        self.configure.push(Box::new(|service, matches| {
            Box::pin(async move {
                let address = string_flag(matches, "metrics-address");
                service.configure_metrics(Arc::new(MetricsServer::new(address)));
                Ok(())
            })
        }));
        self
    }

    /// Enables the healthcheck capability and its `--healthcheck-address`
    /// flag. When `expose_metrics` is set the healthcheck server also serves
    /// `/metrics`.
    pub fn with_healthcheck(mut self, expose_metrics: bool) -> Self
    where
        S: HasHealthcheck,
    {
        self.server_args.push(
            Arg::new("healthcheck-address")
                .long("healthcheck-address")
                .value_name("ADDRESS")
                .default_value("localhost:0")
                .help("listening address for healthcheck probes"),
        );
        self.configure.push(Box::new(move |service, matches| {
            Box::pin(async move {
                let address = string_flag(matches, "healthcheck-address");
                service.configure_healthcheck(Arc::new(HealthServer::new(address, expose_metrics)));
                Ok(())
            })
        }));
        self
    }

    /// Enables the database capability and its `--db-env-prefix` flag.
    ///
    /// The pool is built and probed during the configure phase; a failure
    /// aborts startup entirely, there is no partial start.
    pub fn with_database(mut self) -> Self
    where
        S: HasDatabase,
    {
        self.server_args.push(
            Arg::new("db-env-prefix")
                .long("db-env-prefix")
                .value_name("PREFIX")
                .default_value("DATABASE")
                .help("prefix to env variables with DB configuration"),
        );
        self.configure.push(Box::new(|service, matches| {
            Box::pin(async move {
                let prefix = string_flag(matches, "db-env-prefix");
                let config = database::Config::from_env(&prefix)?;
                let db = Database::connect(&config).await?;
                service.configure_database(db);
                Ok(())
            })
        }));
        self
    }

    /// Enables the reader database capability and its
    /// `--reader-db-env-prefix` flag.
    pub fn with_reader_database(mut self) -> Self
    where
        S: HasReaderDatabase,
    {
        self.server_args.push(
            Arg::new("reader-db-env-prefix")
                .long("reader-db-env-prefix")
                .value_name("PREFIX")
                .default_value("DATABASE_READER")
                .help("prefix to env variables with READER DB configuration"),
        );
        self.configure.push(Box::new(|service, matches| {
            Box::pin(async move {
                let prefix = string_flag(matches, "reader-db-env-prefix");
                let config = database::Config::from_env(&prefix)?;
                let db = ReaderDatabase::connect(&config).await?;
                service.configure_reader_database(db);
                Ok(())
            })
        }));
        self
    }

    /// Adds the `migrate` subcommand.
    pub fn with_migrations(mut self) -> Self {
        self.migrations = true;
        self
    }

    /// The assembled CLI. Only flags of enabled capabilities appear.
    pub fn command(&self) -> Command {
        let server = Command::new("server")
            .visible_alias("start")
            .about("Starts the server")
            .args(self.server_args.iter().cloned());

        let mut root = Command::new(self.name.clone())
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(server);

        if self.migrations {
            root = root.subcommand(
                Command::new("migrate")
                    .about("Migrates the database with the given migrations")
                    .arg(
                        Arg::new("path")
                            .long("path")
                            .short('p')
                            .value_name("PATH")
                            .default_value("./migrations")
                            .help("path to all migrations"),
                    )
                    .arg(
                        Arg::new("db-env-prefix")
                            .long("db-env-prefix")
                            .short('e')
                            .value_name("PREFIX")
                            .default_value("DATABASE")
                            .help("prefix for all DB env variables"),
                    ),
            );
        }

        root
    }

    /// Parses the process arguments and runs the selected subcommand.
    pub async fn execute(self) -> Result<(), Error> {
        let matches = self.command().try_get_matches()?;
        self.dispatch(matches).await
    }

    /// Parses the given arguments and runs the selected subcommand.
    pub async fn execute_from<I, T>(self, args: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command().try_get_matches_from(args)?;
        self.dispatch(matches).await
    }

    async fn dispatch(self, matches: ArgMatches) -> Result<(), Error> {
        match matches.subcommand() {
            Some(("server", sub)) => self.run_server(sub).await,
            Some(("migrate", sub)) => run_migrate(sub).await,
            // subcommand_required(true) makes anything else unrepresentable.
            _ => unreachable!("a subcommand is required"),
        }
    }

    async fn run_server(mut self, matches: &ArgMatches) -> Result<(), Error> {
        // Configure phase: sequential and deterministic; no capability's
        // configuration depends on another's.
        for configure in std::mem::take(&mut self.configure) {
            configure(&mut self.service, matches).await?;
        }

        let service = Arc::new(self.service);

        let watched = service.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_stop(shutdown).await;

            if let Err(error) = watched.stop().await {
                // Shutdown is best-effort; the process still exits.
                tracing::error!(error = %error, "attempt to stop server failed");
            }
        });

        if let Err(error) = service.start().await {
            tracing::error!(error = %error, "server failed");
            return Err(error);
        }

        Ok(())
    }
}

/// Blocks until an external stop request arrives: a termination signal, an
/// interrupt, or the shutdown token being cancelled.
async fn wait_for_stop(shutdown: CancellationToken) {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("interrupt received, exiting"),
        _ = terminate => tracing::info!("termination signal received, exiting"),
        _ = shutdown.cancelled() => tracing::info!("shutdown requested, exiting"),
    }
}

async fn run_migrate(matches: &ArgMatches) -> Result<(), Error> {
    let path = PathBuf::from(string_flag(matches, "path"));
    if !path.is_dir() {
        return Err(Error::Migration(format!(
            "the migrations path {} is not a directory",
            path.display()
        )));
    }

    let prefix = string_flag(matches, "db-env-prefix");
    let config = database::Config::from_env(&prefix)?;
    let db = Database::connect(&config).await?;

    database::migrate(db.pool(), &path).await
}

// All capability flags carry defaults, so lookups are total.
fn string_flag(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}
