//! `SocketRouterService`: turns a locally accepted connection into a cross-runner mailbox
//! hand-off.
//!
//! On `socket_open` it removes the fd from this runner's reactor *before* sending the
//! `socket_move` mail, so no further readiness events for that fd can reach this runner
//! once the mail is in flight. It also prunes the fd from the shared [`OpenSocketSet`]
//! at that same point, since `socket_move` is mail addressed to the target runner and
//! can never be observed here — pruning on any other trigger would leave
//! [`crate::tcp_server_service::TcpServerService`] believing it still owns a descriptor
//! that has already moved. The runner on the receiving end re-adds the fd to its own
//! reactor only after `socket_move` arrives as a local event. This ordering is binding,
//! not incidental: it is what rules out the race where both runners briefly believe they
//! own the same descriptor.

use std::sync::Arc;

use engine_core::{kind, Dict, EngineResult, RunnerContext, Service, ServiceKind};
use engine_io::IoEventLoopService;

use crate::error::NetError;
use crate::tcp_server_service::OpenSocketSet;

pub struct SocketRouterService {
    reactor: Arc<IoEventLoopService>,
    actor: Arc<engine_actor::ActorService>,
    target: String,
    open: OpenSocketSet,
}

impl SocketRouterService {
    #[must_use]
    pub fn new(
        reactor: Arc<IoEventLoopService>,
        actor: Arc<engine_actor::ActorService>,
        target: impl Into<String>,
        open: OpenSocketSet,
    ) -> Self {
        Self {
            reactor,
            actor,
            target: target.into(),
            open,
        }
    }

    fn route(&self, data: &Dict) -> EngineResult<()> {
        if self.target.is_empty() {
            return Err(NetError::EmptyTarget.into());
        }
        let socket_id = data.get_int("socket_id").ok_or(NetError::MissingFd)?;
        let fd = socket_id as std::os::fd::RawFd;

        self.reactor.remove_fd(fd)?;
        self.open.lock().expect("poisoned").remove(&fd);
        tracing::debug!(socket_id, target = %self.target, "routing socket to peer runner");
        let result = self
            .actor
            .send_mail(&self.target, "socket_move", Dict::new().with("socket_id", socket_id));
        if result.is_err() {
            // The fd was already pulled off this runner's reactor; a failed hand-off
            // leaves nothing else owning it, so close it here rather than leak it.
            let _ = self.reactor.close_fd(fd);
        }
        result
    }
}

impl Service for SocketRouterService {
    fn kind(&self) -> ServiceKind {
        kind::SOCKET_ROUTER
    }

    fn dependencies(&self) -> &[ServiceKind] {
        &[kind::IO_EVENT_LOOP, kind::ACTOR]
    }

    fn on_create(&mut self, ctx: &mut RunnerContext) -> EngineResult<()> {
        ctx.subscribe_event("socket_open", self.kind())
    }

    fn on_event(&mut self, _ctx: &mut RunnerContext, event: &str, data: &Dict) -> EngineResult<()> {
        if event == "socket_open" {
            self.route(data)?;
        }
        Ok(())
    }
}

/// The receiving side's counterpart: on `socket_move`, re-add the fd to this runner's own
/// reactor. Kept separate from `SocketRouterService` since a runner only needs whichever
/// half applies to it — a pure source runner never registers this, a pure sink runner
/// never registers the router.
pub struct SocketIntakeService {
    reactor: Arc<IoEventLoopService>,
}

impl SocketIntakeService {
    #[must_use]
    pub fn new(reactor: Arc<IoEventLoopService>) -> Self {
        Self { reactor }
    }
}

pub const SOCKET_INTAKE: ServiceKind = ServiceKind::new(6, "socket_intake");

impl Service for SocketIntakeService {
    fn kind(&self) -> ServiceKind {
        SOCKET_INTAKE
    }

    fn dependencies(&self) -> &[ServiceKind] {
        &[kind::IO_EVENT_LOOP, kind::ACTOR]
    }

    fn on_create(&mut self, ctx: &mut RunnerContext) -> EngineResult<()> {
        ctx.subscribe_event("socket_move", self.kind())
    }

    fn on_event(&mut self, ctx: &mut RunnerContext, event: &str, data: &Dict) -> EngineResult<()> {
        if event != "socket_move" {
            return Ok(());
        }
        let socket_id = data.get_int("socket_id").ok_or(NetError::MissingFd)?;
        self.reactor
            .add_fd(socket_id as std::os::fd::RawFd, engine_io::AddOptions::readable())?;
        tracing::debug!(socket_id, "accepted routed socket");
        ctx.invoke_event("socket_open", data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_actor::ActorService;
    use engine_core::RunnerBuilder;
    use nix::unistd::pipe;
    use std::collections::HashSet;
    use std::os::fd::AsRawFd;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn routing_removes_fd_before_moving_it() {
        let source_reactor = Arc::new(IoEventLoopService::new());
        source_reactor.init().unwrap();
        let (read_fd, write_fd) = pipe().unwrap();
        let fd = read_fd.as_raw_fd();
        source_reactor
            .add_fd(fd, engine_io::AddOptions::readable())
            .unwrap();
        assert!(source_reactor.is_tracked(fd));

        let open: OpenSocketSet = Arc::new(Mutex::new(HashSet::from([fd])));
        let _sink = ActorService::new("router-test-sink").unwrap();
        let source_actor = Arc::new(ActorService::new("router-test-source").unwrap());
        let router = SocketRouterService::new(source_reactor.clone(), source_actor, "router-test-sink", open.clone());

        router.route(&Dict::new().with("socket_id", i64::from(fd))).unwrap();

        assert!(!source_reactor.is_tracked(fd));
        assert!(!open.lock().unwrap().contains(&fd));
        drop(write_fd);
    }

    #[test]
    fn intake_end_to_end_reopens_fd_on_target_runner() {
        let source_reactor = Arc::new(IoEventLoopService::new());
        source_reactor.init().unwrap();
        let (read_fd, write_fd) = pipe().unwrap();
        let fd = read_fd.as_raw_fd();
        source_reactor
            .add_fd(fd, engine_io::AddOptions::readable())
            .unwrap();

        let open: OpenSocketSet = Arc::new(Mutex::new(HashSet::from([fd])));
        let source_actor = Arc::new(ActorService::new("e2e-source").unwrap());
        let router = SocketRouterService::new(source_reactor.clone(), source_actor, "e2e-sink", open);

        let sink_reactor = Arc::new(IoEventLoopService::new());
        let sink_actor = Arc::new(ActorService::new("e2e-sink").unwrap());
        let reopened = Arc::new(AtomicBool::new(false));
        let reopened_clone = reopened.clone();

        struct Confirm {
            kind: ServiceKind,
            fd: std::os::fd::RawFd,
            flag: Arc<AtomicBool>,
        }
        impl Service for Confirm {
            fn kind(&self) -> ServiceKind {
                self.kind
            }
            fn dependencies(&self) -> &[ServiceKind] {
                &[SOCKET_INTAKE]
            }
            fn on_create(&mut self, ctx: &mut RunnerContext) -> EngineResult<()> {
                ctx.subscribe_event("socket_open", self.kind)
            }
            fn on_event(&mut self, _ctx: &mut RunnerContext, event: &str, data: &Dict) -> EngineResult<()> {
                if event == "socket_open" && data.get_int("socket_id") == Some(i64::from(self.fd)) {
                    self.flag.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
        }

        let sink_reactor_for_loop = sink_reactor.clone();
        let (mut sink_runner, sink_stop) = RunnerBuilder::new()
            .with_service(move || engine_io::reactor_service(sink_reactor_for_loop))
            .with_service(move || engine_actor::actor_service(sink_actor))
            .with_service(move || Box::new(SocketIntakeService::new(sink_reactor)))
            .with_service(move || {
                Box::new(Confirm {
                    kind: ServiceKind::new(61, "confirm"),
                    fd,
                    flag: reopened_clone,
                })
            })
            .build_thread_runner()
            .unwrap();

        sink_runner.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));

        router.route(&Dict::new().with("socket_id", i64::from(fd))).unwrap();

        std::thread::sleep(Duration::from_millis(100));
        let _ = sink_runner.stop(&sink_stop);

        assert!(!source_reactor.is_tracked(fd));
        assert!(reopened.load(Ordering::SeqCst));
        drop(write_fd);
    }
}
