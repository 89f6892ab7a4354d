//! `Mail`: the message type routed between mailboxes by [`crate::mail_center::MailCenter`].

use engine_core::Dict;

/// Reserved mailbox name meaning "every mailbox except the sender".
pub const BROADCAST_NAME: &str = "all";

/// Maximum byte length of a mailbox name.
pub const MAX_NAME_LEN: usize = 64;

/// Where a piece of [`Mail`] is headed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Unicast(String),
    Broadcast,
}

/// One message traveling between mailboxes: who sent it, where it's going, the event
/// name it carries (the same event-name vocabulary the in-runner event bus uses), and a
/// flat payload.
#[derive(Debug, Clone)]
pub struct Mail {
    pub from: String,
    pub to: Target,
    pub event: String,
    pub data: Dict,
}

impl Mail {
    #[must_use]
    pub fn unicast(from: impl Into<String>, to: impl Into<String>, event: impl Into<String>, data: Dict) -> Self {
        Self {
            from: from.into(),
            to: Target::Unicast(to.into()),
            event: event.into(),
            data,
        }
    }

    #[must_use]
    pub fn broadcast(from: impl Into<String>, event: impl Into<String>, data: Dict) -> Self {
        Self {
            from: from.into(),
            to: Target::Broadcast,
            event: event.into(),
            data,
        }
    }
}

/// Validate a mailbox name against the rules `MailCenter::create` enforces: non-empty,
/// no longer than [`MAX_NAME_LEN`] bytes, and not the reserved broadcast name.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("mailbox name must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("mailbox name must be at most 64 bytes");
    }
    if name == BROADCAST_NAME {
        return Err("mailbox name 'all' is reserved for broadcast");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_name("").is_err());
    }

    #[test]
    fn rejects_reserved_name() {
        assert!(validate_name("all").is_err());
    }

    #[test]
    fn rejects_too_long_name() {
        let name = "a".repeat(MAX_NAME_LEN + 1);
        assert!(validate_name(&name).is_err());
    }

    #[test]
    fn accepts_ordinary_name() {
        assert!(validate_name("socket-worker-1").is_ok());
    }
}
