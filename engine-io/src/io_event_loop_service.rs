//! `IoEventLoopService`: a thin, typed wrapper over Linux epoll.
//!
//! Grounded on the original engine's `EventLoopLinux` (epoll_create1 on build; epoll_ctl
//! ADD/DEL for `AddFd`/`RemoveFd`; a write loop retrying on `EAGAIN` and reporting a
//! zero-byte write as the peer closing; `OnUpdate` polling with a zero timeout so the
//! runner loop never blocks). Uses the `nix` crate for the raw epoll bindings, the same
//! crate the retrieved example pack reaches for when wrapping OS resources directly.

use std::collections::HashSet;
use std::os::fd::RawFd;
use std::sync::Mutex;

use engine_core::{kind, Dict, EngineResult, RunnerContext, Service, ServiceKind};
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::unistd::{close, read, write};

use crate::error::IoServiceError;

/// Maximum number of ready events drained from epoll in a single `OnUpdate` pass.
pub const MAX_EVENTS: usize = 1024;

/// Readiness interests requested for a descriptor added to the reactor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    pub readable: bool,
    pub writable: bool,
    pub edge_triggered: bool,
}

impl AddOptions {
    #[must_use]
    pub fn readable() -> Self {
        Self {
            readable: true,
            ..Self::default()
        }
    }

    fn to_epoll_flags(self) -> EpollFlags {
        let mut flags = EpollFlags::empty();
        if self.readable {
            flags |= EpollFlags::EPOLLIN;
        }
        if self.writable {
            flags |= EpollFlags::EPOLLOUT;
        }
        if self.edge_triggered {
            flags |= EpollFlags::EPOLLET;
        }
        flags
    }
}

pub struct IoEventLoopService {
    epoll: Mutex<Option<Epoll>>,
    tracked: Mutex<HashSet<RawFd>>,
}

impl Default for IoEventLoopService {
    fn default() -> Self {
        Self::new()
    }
}

impl IoEventLoopService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoll: Mutex::new(None),
            tracked: Mutex::new(HashSet::new()),
        }
    }

    fn with_epoll<R>(&self, f: impl FnOnce(&Epoll) -> EngineResult<R>) -> EngineResult<R> {
        let guard = self.epoll.lock().expect("poisoned");
        let epoll = guard.as_ref().ok_or(IoServiceError::InvalidEpollFd)?;
        f(epoll)
    }

    /// Start watching `fd` for the interests in `options`.
    pub fn add_fd(&self, fd: RawFd, options: AddOptions) -> EngineResult<()> {
        self.with_epoll(|epoll| {
            let event = EpollEvent::new(options.to_epoll_flags(), fd as u64);
            epoll
                .add(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }, event)
                .map_err(|errno| os_err("epoll_ctl(ADD)", errno))?;
            self.tracked.lock().expect("poisoned").insert(fd);
            Ok(())
        })
    }

    /// Stop watching `fd`. Idempotent: removing an fd that was never added, or was
    /// already removed, is not an error.
    pub fn remove_fd(&self, fd: RawFd) -> EngineResult<()> {
        self.with_epoll(|epoll| {
            let _ = epoll.delete(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) });
            self.tracked.lock().expect("poisoned").remove(&fd);
            Ok(())
        })
    }

    /// Write `data` to `fd`, retrying on `EAGAIN`/`EINTR`. A zero-byte write (the peer
    /// has closed its read side) is reported as [`IoServiceError::SocketClosed`] rather
    /// than silently returning `Ok(0)`.
    pub fn write_to_fd(&self, fd: RawFd, data: &[u8]) -> EngineResult<usize> {
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
        let mut total = 0;
        while total < data.len() {
            match write(borrowed, &data[total..]) {
                Ok(0) => return Err(IoServiceError::SocketClosed(fd).into()),
                Ok(n) => total += n,
                Err(Errno::EAGAIN) => continue,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(os_err("write", errno)),
            }
        }
        Ok(total)
    }

    /// Read every byte currently available on `fd`, looping until `EAGAIN`/`EWOULDBLOCK`.
    /// Necessary for edge-triggered fds: a single `read` can leave bytes unconsumed,
    /// which would suppress the next readiness notification. A zero-byte read (the peer
    /// closed its write side) is reported as [`IoServiceError::SocketClosed`] unless some
    /// data was already accumulated, in which case that data is returned and the close is
    /// surfaced on the next call.
    pub fn read_from_fd(&self, fd: RawFd, chunk_size: usize) -> EngineResult<Vec<u8>> {
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
        let mut accumulated = Vec::new();
        let mut chunk = vec![0u8; chunk_size.max(1)];
        loop {
            match read(borrowed, &mut chunk) {
                Ok(0) => {
                    if accumulated.is_empty() {
                        return Err(IoServiceError::SocketClosed(fd).into());
                    }
                    return Ok(accumulated);
                }
                Ok(n) => accumulated.extend_from_slice(&chunk[..n]),
                Err(Errno::EAGAIN) => return Ok(accumulated),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(os_err("read", errno)),
            }
        }
    }

    #[must_use]
    pub fn is_tracked(&self, fd: RawFd) -> bool {
        self.tracked.lock().expect("poisoned").contains(&fd)
    }

    /// Stop watching `fd` and close it outright. For a caller that owns the descriptor
    /// rather than merely routing it elsewhere.
    pub fn close_fd(&self, fd: RawFd) -> EngineResult<()> {
        let _ = self.remove_fd(fd);
        close(fd).map_err(|errno| os_err("close", errno))
    }

    /// Create the underlying epoll instance. Called by `on_create`; exposed directly so
    /// the reactor can be driven in isolation (tests, or an embedder that wants to poll
    /// it manually instead of through a runner).
    pub fn init(&self) -> EngineResult<()> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(|errno| os_err("epoll_create1", errno))?;
        *self.epoll.lock().expect("poisoned") = Some(epoll);
        Ok(())
    }
}

fn os_err(call: &'static str, errno: Errno) -> engine_core::EngineError {
    IoServiceError::Os {
        call,
        errno: errno as i32,
    }
    .into()
}

impl IoEventLoopService {
    /// Drain ready events with a zero timeout and publish `socket_read`/`socket_write`
    /// on the runner's event bus for each. Called once per `OnUpdate` pass.
    pub fn poll(&self, ctx: &mut RunnerContext) -> EngineResult<()> {
        let mut events = vec![EpollEvent::empty(); MAX_EVENTS];
        let ready = {
            let guard = self.epoll.lock().expect("poisoned");
            let Some(epoll) = guard.as_ref() else {
                return Ok(());
            };
            match epoll.wait(&mut events, EpollTimeout::ZERO) {
                Ok(n) => n,
                Err(Errno::EINTR) => 0,
                Err(errno) => return Err(os_err("epoll_wait", errno)),
            }
        };

        for event in &events[..ready] {
            let fd = event.data() as i32;
            let flags = event.events();
            if flags.contains(EpollFlags::EPOLLERR) || flags.contains(EpollFlags::EPOLLHUP) {
                ctx.invoke_event(
                    "socket_close",
                    &Dict::new()
                        .with("socket_id", i64::from(fd))
                        .with("reason", "epoll reported error or hangup"),
                )?;
                continue;
            }
            if flags.contains(EpollFlags::EPOLLIN) {
                ctx.invoke_event("socket_read", &Dict::new().with("socket_id", i64::from(fd)))?;
            }
            if flags.contains(EpollFlags::EPOLLOUT) {
                ctx.invoke_event("socket_write", &Dict::new().with("socket_id", i64::from(fd)))?;
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        *self.epoll.lock().expect("poisoned") = None;
        self.tracked.lock().expect("poisoned").clear();
    }
}

/// Adapts a shared [`IoEventLoopService`] into an `engine_core::Service` so it can be
/// added to a runner's [`engine_core::ServiceMap`] while other services keep holding
/// their own `Arc` clone to call `add_fd`/`write_to_fd`/etc. directly — the same
/// "construct the shared thing once, hand every collaborator an `Arc` to it" wiring the
/// teacher uses for its event bus and registries (`ddd_domain::eventing::engine`).
struct ReactorAdapter(std::sync::Arc<IoEventLoopService>);

impl Service for ReactorAdapter {
    fn kind(&self) -> ServiceKind {
        kind::IO_EVENT_LOOP
    }

    fn on_create(&mut self, _ctx: &mut RunnerContext) -> EngineResult<()> {
        self.0.init()
    }

    fn on_update(&mut self, ctx: &mut RunnerContext) -> EngineResult<()> {
        self.0.poll(ctx)
    }

    fn on_destroy(&mut self, _ctx: &mut RunnerContext) {
        self.0.shutdown();
    }
}

/// Build the `Service` that drives `reactor`'s lifecycle on whichever runner it is
/// added to.
#[must_use]
pub fn reactor_service(reactor: std::sync::Arc<IoEventLoopService>) -> Box<dyn Service> {
    Box::new(ReactorAdapter(reactor))
}
