//! Topological ordering of services by declared dependency, used to decide `OnCreate`
//! order (and its reverse for `OnDestroy`).

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::service::ServiceKind;
use crate::service_map::ServiceMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Returns service kinds ordered so that every dependency precedes its dependents.
///
/// Detects cycles with a classic three-color depth-first search: a kind visited while
/// still `InProgress` on the current path means the path back to it is a cycle, reported
/// as [`crate::error::ErrorKind::CircularDependency`] naming every kind on that cycle. A
/// dependency that names a kind never registered on this runner is reported as
/// [`crate::error::ErrorKind::ConfigInvalid`] naming the dependent service, not the
/// missing one.
pub fn topological_order(map: &ServiceMap) -> EngineResult<Vec<ServiceKind>> {
    let kinds = map.kinds();
    let mut marks: HashMap<u32, Mark> = kinds.iter().map(|k| (k.id, Mark::Unvisited)).collect();
    let mut order = Vec::with_capacity(kinds.len());
    let mut path = Vec::new();

    for kind in &kinds {
        if marks[&kind.id] == Mark::Unvisited {
            visit(map, *kind, &mut marks, &mut path, &mut order)?;
        }
    }

    Ok(order)
}

fn visit(
    map: &ServiceMap,
    kind: ServiceKind,
    marks: &mut HashMap<u32, Mark>,
    path: &mut Vec<ServiceKind>,
    order: &mut Vec<ServiceKind>,
) -> EngineResult<()> {
    marks.insert(kind.id, Mark::InProgress);
    path.push(kind);

    let service = map
        .get(kind)
        .ok_or_else(|| EngineError::service_not_found(kind.name))?;

    for dep in service.dependencies() {
        match marks.get(&dep.id) {
            Some(Mark::Done) => continue,
            Some(Mark::InProgress) => {
                let cycle_start = path.iter().position(|k| k == dep).unwrap_or(0);
                let mut names: Vec<String> = path[cycle_start..].iter().map(ToString::to_string).collect();
                names.push(dep.to_string());
                return Err(EngineError::circular_dependency(&names));
            }
            Some(Mark::Unvisited) => {
                visit(map, *dep, marks, path, order)?;
            }
            None => {
                return Err(EngineError::missing_dependency(kind.name, dep.name));
            }
        }
    }

    path.pop();
    marks.insert(kind.id, Mark::Done);
    order.push(kind);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerContext;
    use crate::service::Service;

    struct Node {
        kind: ServiceKind,
        deps: Vec<ServiceKind>,
    }

    impl Service for Node {
        fn kind(&self) -> ServiceKind {
            self.kind
        }

        fn dependencies(&self) -> &[ServiceKind] {
            &self.deps
        }
    }

    fn node(id: u32, name: &'static str, deps: Vec<ServiceKind>) -> Box<dyn Service> {
        Box::new(Node {
            kind: ServiceKind::new(id, name),
            deps,
        })
    }

    #[test]
    fn independent_services_keep_insertion_order() {
        let mut map = ServiceMap::new();
        map.add(node(1, "a", vec![])).unwrap();
        map.add(node(2, "b", vec![])).unwrap();
        let order = topological_order(&map).unwrap();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn dependency_precedes_dependent() {
        let mut map = ServiceMap::new();
        let a = ServiceKind::new(1, "a");
        map.add(node(1, "a", vec![])).unwrap();
        map.add(node(2, "b", vec![a])).unwrap();
        let order = topological_order(&map).unwrap();
        let pos_a = order.iter().position(|k| k.id == 1).unwrap();
        let pos_b = order.iter().position(|k| k.id == 2).unwrap();
        assert!(pos_a < pos_b);
    }

    #[test]
    fn cycle_is_detected() {
        let mut map = ServiceMap::new();
        let a = ServiceKind::new(1, "a");
        let b = ServiceKind::new(2, "b");
        map.add(node(1, "a", vec![b])).unwrap();
        map.add(node(2, "b", vec![a])).unwrap();
        let err = topological_order(&map).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CircularDependency);
    }

    #[test]
    fn missing_dependency_is_config_invalid_naming_dependent() {
        let mut map = ServiceMap::new();
        let ghost = ServiceKind::new(99, "ghost");
        map.add(node(1, "d", vec![ghost])).unwrap();
        let err = topological_order(&map).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigInvalid);
        assert!(err.to_string().contains('d'));
        assert!(err.to_string().contains("ghost"));
    }

    #[allow(dead_code)]
    fn _type_check(_ctx: &RunnerContext) {}
}
