//! Engine-wide error taxonomy.
//!
//! Every fallible operation in this workspace returns `Result<T, EngineError>`.
//! `EngineError` classifies failures with a closed [`ErrorKind`], carries a
//! human-readable message, and lets callers attach contextual [`Dict`] fields (a
//! socket id, a mailbox name, an errno) without losing the original cause. Crate-local
//! error enums (`engine_actor::MailError`, `engine_io::IoError`, ...) implement
//! [`ErrorCode`] and convert into `EngineError` at the boundary where they cross into
//! `engine-core`, the same layering the rest of the workspace uses for its own errors.

use std::error::Error as StdError;
use std::fmt;

use crate::dict::Dict;

/// Closed classification of every way an engine operation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A signal requested shutdown while a runner was mid-loop.
    Interrupted,
    /// A runner or service was built from invalid configuration.
    ConfigInvalid,
    /// Service dependency resolution found a cycle.
    CircularDependency,
    /// A lookup by service kind found nothing registered.
    ServiceNotFound,
    /// `InvokeEvent` was called for an event with no subscribers.
    NoSubscribers,
    /// `subscribe` was called twice for the same (event, service) pair.
    AlreadySubscribed,
    /// `unsubscribe` was called for a pair that was never subscribed.
    NotSubscribed,
    /// `MailCenter::create` was called with a name already in use.
    MailBoxAlreadyExists,
    /// A mailbox lookup or send targeted an unknown name.
    MailBoxNotFound,
    /// A mailbox name failed validation (empty, too long, or reserved).
    MailBoxNameInvalid,
    /// An epoll operation was issued against a closed or unknown reactor handle.
    InvalidEpollFd,
    /// A read or write observed the peer closing the socket.
    SocketClosed,
    /// The underlying OS call failed; see the wrapped `errno`.
    OsError,
    /// `ThreadRunner::start` was called on an already-running runner.
    ThreadAlreadyStarted,
    /// `ThreadRunner::stop` was called on a runner that was never started.
    ThreadNotStarted,
}

impl ErrorKind {
    #[must_use]
    pub const fn default_code(self) -> &'static str {
        match self {
            Self::Interrupted => "INTERRUPTED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::CircularDependency => "CIRCULAR_DEPENDENCY",
            Self::ServiceNotFound => "SERVICE_NOT_FOUND",
            Self::NoSubscribers => "NO_SUBSCRIBERS",
            Self::AlreadySubscribed => "ALREADY_SUBSCRIBED",
            Self::NotSubscribed => "NOT_SUBSCRIBED",
            Self::MailBoxAlreadyExists => "MAILBOX_ALREADY_EXISTS",
            Self::MailBoxNotFound => "MAILBOX_NOT_FOUND",
            Self::MailBoxNameInvalid => "MAILBOX_NAME_INVALID",
            Self::InvalidEpollFd => "INVALID_EPOLL_FD",
            Self::SocketClosed => "SOCKET_CLOSED",
            Self::OsError => "OS_ERROR",
            Self::ThreadAlreadyStarted => "THREAD_ALREADY_STARTED",
            Self::ThreadNotStarted => "THREAD_NOT_STARTED",
        }
    }

    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Interrupted => "interrupted by shutdown signal",
            Self::ConfigInvalid => "configuration is invalid",
            Self::CircularDependency => "service dependency graph has a cycle",
            Self::ServiceNotFound => "no service registered for that kind",
            Self::NoSubscribers => "event has no subscribers",
            Self::AlreadySubscribed => "already subscribed to that event",
            Self::NotSubscribed => "not subscribed to that event",
            Self::MailBoxAlreadyExists => "a mailbox with that name already exists",
            Self::MailBoxNotFound => "no mailbox with that name exists",
            Self::MailBoxNameInvalid => "mailbox name is empty, too long, or reserved",
            Self::InvalidEpollFd => "epoll handle is closed or unknown",
            Self::SocketClosed => "peer closed the socket",
            Self::OsError => "operating system call failed",
            Self::ThreadAlreadyStarted => "runner thread is already started",
            Self::ThreadNotStarted => "runner thread was never started",
        }
    }

    /// Whether retrying the same operation unchanged could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::OsError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default_message())
    }
}

/// Protocol implemented by every error type in the workspace, including crate-local
/// enums defined with `thiserror` in `engine-actor`/`engine-io`/`engine-net`.
pub trait ErrorCode: StdError + Send + Sync + 'static {
    fn kind(&self) -> ErrorKind;

    fn code(&self) -> &str {
        self.kind().default_code()
    }

    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

enum Repr {
    Simple,
    Message(Box<str>),
    Custom(Box<dyn StdError + Send + Sync>),
}

/// The engine's universal error type.
pub struct EngineError {
    kind: ErrorKind,
    code: Option<&'static str>,
    context: Dict,
    repr: Repr,
}

impl EngineError {
    #[must_use]
    pub const fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            code: None,
            context: Dict::new(),
            repr: Repr::Simple,
        }
    }

    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<Box<str>>) -> Self {
        Self {
            kind,
            code: None,
            context: Dict::new(),
            repr: Repr::Message(message.into()),
        }
    }

    #[must_use]
    pub fn custom<E>(kind: ErrorKind, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            code: None,
            context: Dict::new(),
            repr: Repr::Custom(Box::new(error)),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<crate::dict::Value>) -> Self {
        self.context.insert(key, value);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn static_code(&self) -> &'static str {
        self.code.unwrap_or_else(|| self.kind.default_code())
    }

    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match &self.repr {
            Repr::Custom(error) => error.downcast_ref(),
            _ => None,
        }
    }

    /// Flatten this error into the `Dict` representation the spec's boundary contract
    /// calls for: a mandatory `message` key plus whatever contextual keys were attached.
    #[must_use]
    pub fn into_dict(self) -> Dict {
        let message = self.to_string();
        self.context
            .clone()
            .with("message", message)
            .with("code", self.static_code())
    }

    #[must_use]
    pub fn interrupted() -> Self {
        Self::from_kind(ErrorKind::Interrupted)
    }

    #[must_use]
    pub fn service_not_found(kind_name: impl Into<String>) -> Self {
        let name = kind_name.into();
        Self::new(ErrorKind::ServiceNotFound, format!("service not found: {name}"))
            .with_context("kind", name)
    }

    #[must_use]
    pub fn no_subscribers(event: impl Into<String>) -> Self {
        let event = event.into();
        Self::new(ErrorKind::NoSubscribers, format!("event '{event}' has no subscribers")).with_context("event", event)
    }

    #[must_use]
    pub fn circular_dependency(cycle: &[String]) -> Self {
        Self::new(
            ErrorKind::CircularDependency,
            format!("circular dependency: {}", cycle.join(" -> ")),
        )
        .with_context("cycle", cycle.join(","))
    }

    /// A service declared a dependency on a kind that is not registered on the runner.
    #[must_use]
    pub fn missing_dependency(dependent: impl Into<String>, dependency: impl Into<String>) -> Self {
        let dependent = dependent.into();
        let dependency = dependency.into();
        Self::new(
            ErrorKind::ConfigInvalid,
            format!("{dependent} depends on {dependency}, which is not registered on this runner"),
        )
        .with_context("dependent", dependent)
        .with_context("dependency", dependency)
    }

    #[must_use]
    pub fn os_error(errno: i32, what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::OsError, format!("{what}: errno {errno}")).with_context("errno", i64::from(errno))
    }
}

impl ErrorCode for EngineError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn code(&self) -> &str {
        self.static_code()
    }
}

impl fmt::Debug for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("EngineError");
        d.field("kind", &self.kind);
        if let Some(code) = self.code {
            d.field("code", &code);
        }
        match &self.repr {
            Repr::Simple => {
                d.field("message", &self.kind.default_message());
            }
            Repr::Message(msg) => {
                d.field("message", msg);
            }
            Repr::Custom(err) => {
                d.field("source", err);
            }
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Simple => write!(f, "{}", self.kind.default_message()),
            Repr::Message(msg) => write!(f, "{msg}"),
            Repr::Custom(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for EngineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.repr {
            Repr::Custom(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<ErrorKind> for EngineError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_stable_code() {
        assert_eq!(ErrorKind::ServiceNotFound.default_code(), "SERVICE_NOT_FOUND");
        assert_eq!(ErrorKind::MailBoxNameInvalid.default_code(), "MAILBOX_NAME_INVALID");
    }

    #[test]
    fn os_error_is_retryable() {
        assert!(ErrorKind::OsError.is_retryable());
        assert!(!ErrorKind::Interrupted.is_retryable());
    }

    #[test]
    fn into_dict_carries_message_and_context() {
        let err = EngineError::service_not_found("signal");
        let dict = err.into_dict();
        assert_eq!(dict.get_str("message"), Some("service not found: signal"));
        assert_eq!(dict.get_str("kind"), Some("signal"));
        assert_eq!(dict.get_str("code"), Some("SERVICE_NOT_FOUND"));
    }

    #[test]
    fn custom_error_round_trips_via_downcast() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "boom");
        let err = EngineError::custom(ErrorKind::OsError, io_err);
        assert!(err.downcast_ref::<io::Error>().is_some());
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn circular_dependency_message_lists_cycle() {
        let cycle = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let err = EngineError::circular_dependency(&cycle);
        assert_eq!(err.kind(), ErrorKind::CircularDependency);
        assert!(err.to_string().contains("a -> b -> a"));
    }
}
