//! I/O-local error type, converted into [`EngineError`] at the crate boundary.

use engine_core::{EngineError, ErrorCode, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoServiceError {
    #[error("epoll handle is closed or was never created")]
    InvalidEpollFd,
    #[error("socket (fd {0}) was closed by the peer")]
    SocketClosed(i32),
    #[error("os call '{call}' failed: errno {errno}")]
    Os { call: &'static str, errno: i32 },
}

impl ErrorCode for IoServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEpollFd => ErrorKind::InvalidEpollFd,
            Self::SocketClosed(_) => ErrorKind::SocketClosed,
            Self::Os { .. } => ErrorKind::OsError,
        }
    }
}

impl From<IoServiceError> for EngineError {
    fn from(err: IoServiceError) -> Self {
        let kind = err.kind();
        EngineError::custom(kind, err)
    }
}
