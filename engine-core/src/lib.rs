//! Core runner/service lifecycle, the in-runner event bus, the `Dict` payload type, and
//! the engine-wide error taxonomy. Everything in this crate runs on a single thread at a
//! time; cross-thread coordination is the concern of `engine-actor`.

pub mod dict;
pub mod error;
pub mod event_bus;
pub mod runner;
pub mod service;
pub mod service_map;
pub mod signal;
pub mod traverser;

pub use dict::{Dict, Value};
pub use error::{EngineError, EngineResult, ErrorCode, ErrorKind};
pub use runner::{Runner, RunnerBuilder, RunnerContext, StopHandle, ThreadRunner};
pub use service::{kind, Service, ServiceFactory, ServiceKind};
pub use service_map::ServiceMap;
pub use signal::SignalService;
