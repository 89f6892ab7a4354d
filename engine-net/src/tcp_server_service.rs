//! `TcpServerService`: binds one listening socket and turns readiness on it into accepted
//! connections, published locally as `socket_open` events.
//!
//! Grounded on the original engine's `TcpServer` (bind, set nonblocking, register with the
//! reactor, accept in a loop until `EAGAIN`). Sockets are tracked as raw descriptors rather
//! than `std::net::TcpStream` values: once a connection is handed to [`crate::socket_router_service::SocketRouterService`]
//! for a cross-runner move, ownership of the fd itself (not a Rust value wrapping it)
//! is what travels, so this service never lets a `TcpStream`'s `Drop` compete with that
//! hand-off. The socket id is the descriptor's numeric value itself, not a separately
//! minted counter, so it stays meaningful once it crosses into another runner's reactor.

use std::collections::HashSet;
use std::net::TcpListener;
use std::os::fd::{IntoRawFd, RawFd};
use std::sync::{Arc, Mutex};

use engine_core::{kind, Dict, EngineResult, RunnerContext, Service, ServiceKind};
use engine_io::{AddOptions, IoEventLoopService};
use nix::errno::Errno;
use nix::sys::socket::{accept4, SockFlag};

use crate::error::NetError;

/// Fds this runner has accepted and not yet routed away or closed, shared with
/// [`crate::socket_router_service::SocketRouterService`] so a routed fd is pruned the
/// moment it's handed off rather than through an event that can't reach this runner.
pub type OpenSocketSet = Arc<Mutex<HashSet<RawFd>>>;

pub struct TcpServerService {
    reactor: Arc<IoEventLoopService>,
    port: u16,
    listen_fd: Option<RawFd>,
    open: OpenSocketSet,
}

impl TcpServerService {
    #[must_use]
    pub fn new(reactor: Arc<IoEventLoopService>, port: u16, open: OpenSocketSet) -> Self {
        Self {
            reactor,
            port,
            listen_fd: None,
            open,
        }
    }

    #[must_use]
    pub fn open_connection_count(&self) -> usize {
        self.open.lock().expect("poisoned").len()
    }

    fn accept_loop(&self, ctx: &mut RunnerContext) -> EngineResult<()> {
        let Some(listen_fd) = self.listen_fd else {
            return Ok(());
        };
        loop {
            match accept4(listen_fd, SockFlag::SOCK_NONBLOCK) {
                Ok(fd) => {
                    if let Err(err) = self.reactor.add_fd(fd, AddOptions::readable()) {
                        // Never made it into the reactor or `self.open`; nothing else
                        // will ever close this fd, so close it here rather than leak it.
                        let _ = self.reactor.close_fd(fd);
                        return Err(err);
                    }
                    self.open.lock().expect("poisoned").insert(fd);
                    tracing::debug!(socket_id = fd, "accepted connection");
                    ctx.invoke_event("socket_open", &Dict::new().with("socket_id", i64::from(fd)))?;
                }
                Err(Errno::EAGAIN) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(NetError::Os { call: "accept4", errno: errno as i32 }.into()),
            }
        }
    }
}

impl Service for TcpServerService {
    fn kind(&self) -> ServiceKind {
        kind::TCP_SERVER
    }

    fn dependencies(&self) -> &[ServiceKind] {
        &[kind::IO_EVENT_LOOP]
    }

    fn on_create(&mut self, ctx: &mut RunnerContext) -> EngineResult<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .map_err(|e| NetError::Os { call: "bind", errno: e.raw_os_error().unwrap_or(0) })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| NetError::Os { call: "set_nonblocking", errno: e.raw_os_error().unwrap_or(0) })?;
        let fd = listener.into_raw_fd();
        self.reactor.add_fd(fd, AddOptions::readable())?;
        self.listen_fd = Some(fd);
        tracing::info!(port = self.port, fd, "tcp server listening");

        ctx.subscribe_event("socket_read", self.kind())
    }

    fn on_event(&mut self, ctx: &mut RunnerContext, event: &str, data: &Dict) -> EngineResult<()> {
        if event == "socket_read" && data.get_int("socket_id") == self.listen_fd.map(i64::from) {
            self.accept_loop(ctx)?;
        }
        Ok(())
    }

    fn on_destroy(&mut self, _ctx: &mut RunnerContext) {
        if let Some(fd) = self.listen_fd.take() {
            let _ = self.reactor.close_fd(fd);
        }
        for fd in self.open.lock().expect("poisoned").drain() {
            let _ = self.reactor.close_fd(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{RunnerBuilder, Service as _};
    use std::net::TcpStream;
    use std::time::Duration;

    fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn accepted_connection_publishes_socket_open() {
        let reactor = Arc::new(IoEventLoopService::new());
        let port = free_port();
        let received = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let received_clone = received.clone();

        struct Listener {
            kind: ServiceKind,
            received: Arc<std::sync::atomic::AtomicBool>,
        }
        impl Service for Listener {
            fn kind(&self) -> ServiceKind {
                self.kind
            }
            fn on_create(&mut self, ctx: &mut RunnerContext) -> EngineResult<()> {
                ctx.subscribe_event("socket_open", self.kind)
            }
            fn on_event(&mut self, _ctx: &mut RunnerContext, event: &str, data: &Dict) -> EngineResult<()> {
                if event == "socket_open" && data.get_int("socket_id").is_some() {
                    self.received.store(true, std::sync::atomic::Ordering::SeqCst);
                }
                Ok(())
            }
        }

        let reactor_for_server = reactor.clone();
        let open: OpenSocketSet = Arc::new(Mutex::new(HashSet::new()));
        let (mut runner, stop) = RunnerBuilder::new()
            .with_service(move || engine_io::reactor_service(reactor_for_server))
            .with_service(move || Box::new(TcpServerService::new(reactor, port, open)))
            .with_service(move || {
                Box::new(Listener {
                    kind: ServiceKind::new(60, "open_listener"),
                    received: received_clone,
                })
            })
            .build_thread_runner()
            .unwrap();

        runner.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let _ = TcpStream::connect(("127.0.0.1", port)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let _ = runner.stop(&stop);

        assert!(received.load(std::sync::atomic::Ordering::SeqCst));
    }
}
