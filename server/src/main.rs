//! Entry point wiring concrete services onto concrete runners. The only crate in the
//! workspace allowed to know about CLI parsing, process-wide logging setup, and how many
//! worker runners a deployment wants.

use std::collections::HashSet;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use engine_actor::{actor_service, ActorService};
use engine_core::{kind, Dict, EngineResult, RunnerBuilder, RunnerContext, Service, ServiceKind, SignalService};
use engine_io::IoEventLoopService;
use engine_net::{OpenSocketSet, SocketIntakeService, SocketRouterService, TcpServerService};
use tracing_subscriber::EnvFilter;

const READ_CHUNK_SIZE: usize = 4096;

/// Adopts descriptors routed onto this worker: reads what's readable, logs what happens
/// on write readiness and close, and drops its own bookkeeping once a socket is gone.
/// Exists because `IoEventLoopService`/`SocketIntakeService` only get a descriptor back
/// into the reactor and republish `socket_open` locally — something still has to consume
/// the events that follow, or `RunnerContext::invoke_event` has no subscriber to call.
struct ConnectionService {
    reactor: Arc<IoEventLoopService>,
    open: Mutex<HashSet<RawFd>>,
}

impl ConnectionService {
    fn new(reactor: Arc<IoEventLoopService>) -> Self {
        Self {
            reactor,
            open: Mutex::new(HashSet::new()),
        }
    }
}

const CONNECTION: ServiceKind = ServiceKind::new(7, "connection");

impl Service for ConnectionService {
    fn kind(&self) -> ServiceKind {
        CONNECTION
    }

    fn dependencies(&self) -> &[ServiceKind] {
        &[kind::IO_EVENT_LOOP]
    }

    fn on_create(&mut self, ctx: &mut RunnerContext) -> EngineResult<()> {
        ctx.subscribe_event("socket_open", self.kind())?;
        ctx.subscribe_event("socket_read", self.kind())?;
        ctx.subscribe_event("socket_write", self.kind())?;
        ctx.subscribe_event("socket_close", self.kind())
    }

    fn on_event(&mut self, _ctx: &mut RunnerContext, event: &str, data: &Dict) -> EngineResult<()> {
        let Some(socket_id) = data.get_int("socket_id") else {
            return Ok(());
        };
        let fd = socket_id as RawFd;
        match event {
            "socket_open" => {
                self.open.lock().expect("poisoned").insert(fd);
                tracing::info!(socket_id, "connection adopted");
            }
            "socket_read" => {
                if !self.open.lock().expect("poisoned").contains(&fd) {
                    return Ok(());
                }
                match self.reactor.read_from_fd(fd, READ_CHUNK_SIZE) {
                    Ok(bytes) => tracing::debug!(socket_id, bytes = bytes.len(), "read from connection"),
                    Err(err) if err.kind() == engine_core::ErrorKind::SocketClosed => {
                        if self.open.lock().expect("poisoned").remove(&fd) {
                            tracing::info!(socket_id, "connection closed by peer");
                            let _ = self.reactor.close_fd(fd);
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
            "socket_write" => {
                tracing::debug!(socket_id, "connection writable");
            }
            "socket_close" => {
                if self.open.lock().expect("poisoned").remove(&fd) {
                    let reason = data.get_str("reason").unwrap_or_default();
                    tracing::info!(socket_id, reason, "connection closed");
                    let _ = self.reactor.close_fd(fd);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_destroy(&mut self, _ctx: &mut RunnerContext) {
        for fd in self.open.lock().expect("poisoned").drain() {
            let _ = self.reactor.close_fd(fd);
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "server", about = "Runner/service engine: accepts TCP connections and routes them to named worker mailboxes.")]
struct Cli {
    /// TCP port the main runner's listener binds to.
    #[arg(long, env = "SERVER_PORT")]
    port: u16,

    /// Name of a worker runner to start, each hosting its own mailbox and reactor.
    /// Repeat the flag to start more than one.
    #[arg(long = "worker", value_name = "NAME")]
    workers: Vec<String>,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server exited with an error");
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if cli.workers.is_empty() {
        anyhow::bail!("at least one --worker is required: the main runner routes accepted sockets to it");
    }
    let primary_worker = cli.workers[0].clone();

    let mut worker_handles = Vec::new();
    for name in &cli.workers {
        let reactor = Arc::new(IoEventLoopService::new());
        let actor = Arc::new(ActorService::new(name).context("registering worker mailbox")?);
        let reactor_for_intake = reactor.clone();
        let reactor_for_connections = reactor.clone();
        let (mut runner, stop) = RunnerBuilder::new()
            .with_service(move || engine_io::reactor_service(reactor.clone()))
            .with_service(move || actor_service(actor))
            .with_service(move || Box::new(SocketIntakeService::new(reactor_for_intake)))
            .with_service(move || Box::new(ConnectionService::new(reactor_for_connections)))
            .with_service(|| Box::new(SignalService::new()))
            .build_thread_runner()
            .context("building worker runner")?;
        runner.start().context("starting worker runner")?;
        tracing::info!(worker = %name, "worker runner started");
        worker_handles.push((runner, stop));
    }

    let main_reactor = Arc::new(IoEventLoopService::new());
    let main_actor = Arc::new(ActorService::new("main").context("registering main mailbox")?);
    let port = cli.port;
    let main_reactor_for_server = main_reactor.clone();
    let main_reactor_for_router = main_reactor.clone();
    let main_actor_for_router = main_actor.clone();
    let main_open: OpenSocketSet = Arc::new(Mutex::new(HashSet::new()));
    let main_open_for_server = main_open.clone();

    let mut main_runner = RunnerBuilder::new()
        .with_service(move || engine_io::reactor_service(main_reactor.clone()))
        .with_service(move || actor_service(main_actor))
        .with_service(move || Box::new(TcpServerService::new(main_reactor_for_server, port, main_open_for_server)))
        .with_service(move || {
            Box::new(SocketRouterService::new(
                main_reactor_for_router,
                main_actor_for_router,
                primary_worker,
                main_open,
            ))
        })
        .with_service(|| Box::new(SignalService::new()))
        .build()
        .context("building main runner")?;

    tracing::info!(port, "main runner starting");
    let result = main_runner.run();

    for (mut runner, stop) in worker_handles {
        let _ = runner.stop(&stop);
    }

    result.context("main runner loop")
}
