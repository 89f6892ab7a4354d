//! The per-runner registry of live services, keyed by [`ServiceKind`] id and name.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::service::{Service, ServiceKind};

/// Owns every service hosted by one runner.
///
/// Lookups never hand out a `&mut` alongside the rest of the map: instead
/// [`ServiceMap::take`] removes a service so the runner loop can call its lifecycle
/// methods with unrestricted access to a [`crate::runner::RunnerContext`] that itself
/// borrows this map, then [`ServiceMap::put`] reinserts it. This mirrors how the runner
/// loop in the original engine only ever has one service's lifecycle method active at a
/// time.
#[derive(Default)]
pub struct ServiceMap {
    services: HashMap<u32, Box<dyn Service>>,
    name_to_id: HashMap<String, u32>,
}

impl ServiceMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, service: Box<dyn Service>) -> EngineResult<()> {
        let kind = service.kind();
        if self.services.contains_key(&kind.id) {
            return Err(EngineError::new(
                ErrorKind::ConfigInvalid,
                format!("service kind already registered: {kind}"),
            ));
        }
        self.name_to_id.insert(kind.name.to_string(), kind.id);
        self.services.insert(kind.id, service);
        Ok(())
    }

    #[must_use]
    pub fn has(&self, kind: ServiceKind) -> bool {
        self.services.contains_key(&kind.id)
    }

    #[must_use]
    pub fn get(&self, kind: ServiceKind) -> Option<&dyn Service> {
        self.services.get(&kind.id).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&dyn Service> {
        let id = self.name_to_id.get(name)?;
        self.services.get(id).map(AsRef::as_ref)
    }

    pub fn take(&mut self, kind: ServiceKind) -> Option<Box<dyn Service>> {
        self.services.remove(&kind.id)
    }

    pub fn put(&mut self, service: Box<dyn Service>) {
        let kind = service.kind();
        self.services.insert(kind.id, service);
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<ServiceKind> {
        self.services.values().map(|s| s.kind()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Box<dyn Service>> {
        self.name_to_id.clear();
        self.services.drain().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerContext;

    struct Noop(ServiceKind);
    impl Service for Noop {
        fn kind(&self) -> ServiceKind {
            self.0
        }
    }

    #[test]
    fn add_then_get_by_id_and_name() {
        let mut map = ServiceMap::new();
        map.add(Box::new(Noop(ServiceKind::new(9, "noop")))).unwrap();
        assert!(map.has(ServiceKind::new(9, "noop")));
        assert!(map.get_by_name("noop").is_some());
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let mut map = ServiceMap::new();
        map.add(Box::new(Noop(ServiceKind::new(9, "noop")))).unwrap();
        let err = map.add(Box::new(Noop(ServiceKind::new(9, "noop")))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn take_then_put_preserves_membership() {
        let mut map = ServiceMap::new();
        let kind = ServiceKind::new(9, "noop");
        map.add(Box::new(Noop(kind))).unwrap();
        let svc = map.take(kind).expect("service present");
        assert!(!map.has(kind));
        map.put(svc);
        assert!(map.has(kind));
    }

    #[allow(dead_code)]
    fn _type_check(_ctx: &RunnerContext) {}
}
