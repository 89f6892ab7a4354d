//! Net-local error type, converted into [`EngineError`] at the crate boundary.

use engine_core::{EngineError, ErrorCode, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("socket_open event carried no usable fd")]
    MissingFd,
    #[error("socket_open routed to an empty target mailbox name")]
    EmptyTarget,
    #[error("os call '{call}' failed: errno {errno}")]
    Os { call: &'static str, errno: i32 },
}

impl ErrorCode for NetError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFd | Self::EmptyTarget => ErrorKind::ConfigInvalid,
            Self::Os { .. } => ErrorKind::OsError,
        }
    }
}

impl From<NetError> for EngineError {
    fn from(err: NetError) -> Self {
        let kind = err.kind();
        EngineError::custom(kind, err)
    }
}
