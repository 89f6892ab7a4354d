//! Service identity and the lifecycle trait every long-lived component implements.

use crate::dict::Dict;
use crate::error::EngineResult;
use crate::runner::RunnerContext;

/// Stable identity of a service kind: a small integer id plus a human-readable name.
///
/// Equality and hashing are based on `id` alone so two `ServiceKind`s constructed with
/// the same id but (by programmer error) different names are still treated as the same
/// kind rather than silently creating duplicate map entries.
#[derive(Debug, Clone, Copy)]
pub struct ServiceKind {
    pub id: u32,
    pub name: &'static str,
}

impl ServiceKind {
    #[must_use]
    pub const fn new(id: u32, name: &'static str) -> Self {
        Self { id, name }
    }
}

impl PartialEq for ServiceKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKind {}

impl std::hash::Hash for ServiceKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Reserved kind ids used by built-in services, mirroring the fixed ids the original
/// engine assigns so that services written against this crate can depend on them by
/// constant rather than by string lookup.
pub mod kind {
    use super::ServiceKind;

    pub const SIGNAL: ServiceKind = ServiceKind::new(1, "signal");
    pub const ACTOR: ServiceKind = ServiceKind::new(2, "actor");
    pub const IO_EVENT_LOOP: ServiceKind = ServiceKind::new(3, "io_event_loop");
    pub const TCP_SERVER: ServiceKind = ServiceKind::new(4, "tcp_server");
    pub const SOCKET_ROUTER: ServiceKind = ServiceKind::new(5, "socket_router");
}

/// A long-lived, lifecycle-managed component hosted by exactly one [`crate::runner::Runner`].
///
/// `OnCreate` runs once, in dependency order, before the runner's loop starts.
/// `OnUpdate` runs once per loop iteration, also in dependency order. `OnDestroy` runs
/// once, in reverse dependency order, after the loop exits (whether it exited because of
/// a shutdown signal or a fatal error). `OnEvent` is invoked synchronously whenever an
/// event this service subscribed to is published on the runner's event bus.
pub trait Service: Send {
    fn kind(&self) -> ServiceKind;

    /// Kinds of services that must be created before this one and destroyed after it.
    fn dependencies(&self) -> &[ServiceKind] {
        &[]
    }

    fn on_create(&mut self, _ctx: &mut RunnerContext) -> EngineResult<()> {
        Ok(())
    }

    fn on_update(&mut self, _ctx: &mut RunnerContext) -> EngineResult<()> {
        Ok(())
    }

    fn on_destroy(&mut self, _ctx: &mut RunnerContext) {}

    fn on_event(&mut self, _ctx: &mut RunnerContext, _event: &str, _data: &Dict) -> EngineResult<()> {
        Ok(())
    }
}

/// A `Service` factory deferred until a [`crate::runner::Runner`] is assembling its
/// context, so services can be declared before the runner that will host them exists.
pub type ServiceFactory = Box<dyn FnOnce() -> Box<dyn Service> + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_equality_ignores_name_mismatch() {
        let a = ServiceKind::new(1, "signal");
        let b = ServiceKind::new(1, "not_signal");
        assert_eq!(a, b);
    }

    #[test]
    fn kind_inequality_by_id() {
        assert_ne!(kind::SIGNAL, kind::ACTOR);
    }

    #[test]
    fn kind_display_includes_id_and_name() {
        assert_eq!(kind::SIGNAL.to_string(), "signal#1");
    }
}
