//! The in-runner, string-keyed, synchronous event bus.
//!
//! Subscription and publication both happen on the runner's own thread: `invoke` calls
//! every subscriber's `on_event` in subscription order before returning, and returns an
//! aggregate error if any subscriber failed rather than aborting after the first one, so
//! one failing handler never starves the others of their turn.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::service::ServiceKind;

#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<String, Vec<ServiceKind>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, event: &str, kind: ServiceKind) -> EngineResult<()> {
        let subs = self.subscribers.entry(event.to_string()).or_default();
        if subs.contains(&kind) {
            return Err(EngineError::new(
                ErrorKind::AlreadySubscribed,
                format!("{kind} is already subscribed to '{event}'"),
            ));
        }
        subs.push(kind);
        Ok(())
    }

    pub fn unsubscribe(&mut self, event: &str, kind: ServiceKind) -> EngineResult<()> {
        let Some(subs) = self.subscribers.get_mut(event) else {
            return Err(EngineError::new(
                ErrorKind::NotSubscribed,
                format!("{kind} is not subscribed to '{event}'"),
            ));
        };
        let before = subs.len();
        subs.retain(|k| *k != kind);
        if subs.len() == before {
            return Err(EngineError::new(
                ErrorKind::NotSubscribed,
                format!("{kind} is not subscribed to '{event}'"),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn subscribers_of(&self, event: &str) -> Vec<ServiceKind> {
        self.subscribers.get(event).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ServiceKind = ServiceKind::new(1, "a");
    const B: ServiceKind = ServiceKind::new(2, "b");

    #[test]
    fn subscribe_then_lookup() {
        let mut bus = EventBus::new();
        bus.subscribe("socket_open", A).unwrap();
        bus.subscribe("socket_open", B).unwrap();
        assert_eq!(bus.subscribers_of("socket_open"), vec![A, B]);
    }

    #[test]
    fn duplicate_subscribe_is_rejected() {
        let mut bus = EventBus::new();
        bus.subscribe("socket_open", A).unwrap();
        let err = bus.subscribe("socket_open", A).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadySubscribed);
    }

    #[test]
    fn unsubscribe_unknown_is_rejected() {
        let mut bus = EventBus::new();
        let err = bus.unsubscribe("socket_open", A).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSubscribed);
    }

    #[test]
    fn unsubscribe_removes_single_entry() {
        let mut bus = EventBus::new();
        bus.subscribe("socket_open", A).unwrap();
        bus.subscribe("socket_open", B).unwrap();
        bus.unsubscribe("socket_open", A).unwrap();
        assert_eq!(bus.subscribers_of("socket_open"), vec![B]);
    }
}
