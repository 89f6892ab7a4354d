//! Mailbox-local error type, converted into [`EngineError`] at the crate boundary the
//! same way the teacher's application-layer error wraps its domain-layer error.

use engine_core::{EngineError, ErrorCode, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mailbox name invalid: {0}")]
    NameInvalid(String),
    #[error("mailbox '{0}' already exists")]
    AlreadyExists(String),
    #[error("mailbox '{0}' not found")]
    NotFound(String),
    #[error("mailbox '{0}' is disconnected from the mail center")]
    Disconnected(String),
}

impl ErrorCode for MailError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NameInvalid(_) => ErrorKind::MailBoxNameInvalid,
            Self::AlreadyExists(_) => ErrorKind::MailBoxAlreadyExists,
            Self::NotFound(_) | Self::Disconnected(_) => ErrorKind::MailBoxNotFound,
        }
    }
}

impl From<MailError> for EngineError {
    fn from(err: MailError) -> Self {
        EngineError::custom(err.kind(), err)
    }
}
