//! The epoll-backed I/O reactor service.

pub mod error;
pub mod io_event_loop_service;

pub use error::IoServiceError;
pub use io_event_loop_service::{reactor_service, AddOptions, IoEventLoopService, MAX_EVENTS};
