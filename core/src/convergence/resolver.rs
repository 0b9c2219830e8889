//! Static dependency resolver for the staged strategy.
//!
//! Builds the whole graph once from a fully populated store and orders it
//! with Kahn's algorithm. Ties go to store (name) order so the result is
//! reproducible. Cycles are reported before anything is returned.

use std::collections::{BTreeMap, HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::data::ObjectStore;
use crate::error::{CdistError, Result};
use crate::types::object::ObjectName;


#[derive(Debug)]
pub struct DependencyResolver {
    order: Vec<ObjectName>,
    dependencies: BTreeMap<ObjectName, Vec<ObjectName>>,
}


impl DependencyResolver {
    /// Resolve every object in `store`. Both `requirements` and
    /// `autorequire` count as edges.
    pub fn new(store: &ObjectStore) -> Result<Self> {
        let mut graph: DiGraph<ObjectName, ()> = DiGraph::new();
        let mut index: HashMap<ObjectName, NodeIndex> = HashMap::new();
        let mut insertion_order = Vec::with_capacity(store.len());

        for object in store.list_objects() {
            let idx = graph.add_node(object.name.clone());
            index.insert(object.name.clone(), idx);
            insertion_order.push(idx);
        }

        let mut dependencies = BTreeMap::new();
        for (object, &to) in store.list_objects().zip(&insertion_order) {
            let mut deps: Vec<ObjectName> = Vec::new();
            for dep in object.requirements.iter().chain(object.autorequire.iter()) {
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }
            for dep in &deps {
                let from = index.get(dep).ok_or_else(|| CdistError::MissingRequirement {
                    object: object.name.to_string(),
                    requirement: dep.to_string(),
                })?;
                graph.add_edge(*from, to, ());
            }
            dependencies.insert(object.name.clone(), deps);
        }

        let order = toposort(&graph, &insertion_order)?;
        Ok(DependencyResolver {
            order,
            dependencies,
        })
    }

    /// Objects in an order where each comes after everything it depends on.
    pub fn order(&self) -> &[ObjectName] {
        &self.order
    }

    /// Direct dependencies of `name`, requirements first.
    pub fn dependencies(&self, name: &ObjectName) -> &[ObjectName] {
        self.dependencies.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}


impl IntoIterator for DependencyResolver {
    type Item = ObjectName;
    type IntoIter = std::vec::IntoIter<ObjectName>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}


fn toposort(graph: &DiGraph<ObjectName, ()>, insertion_order: &[NodeIndex]) -> Result<Vec<ObjectName>> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
        .collect();

    let mut queue: VecDeque<NodeIndex> = insertion_order
        .iter()
        .filter(|idx| in_degree.get(*idx).copied().unwrap_or(0) == 0)
        .copied()
        .collect();

    let mut sorted = Vec::with_capacity(graph.node_count());
    while let Some(idx) = queue.pop_front() {
        sorted.push(graph[idx].clone());

        let mut next: Vec<NodeIndex> = graph.neighbors_directed(idx, Direction::Outgoing).collect();
        next.sort_by_key(|n| n.index());
        for n in next {
            if let Some(deg) = in_degree.get_mut(&n) {
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    queue.push_back(n);
                }
            }
        }
    }

    if sorted.len() != graph.node_count() {
        return Err(CdistError::CyclicDependency {
            cycle: find_cycle(graph),
        });
    }
    Ok(sorted)
}


/// Names of the first strongly connected component that forms a cycle,
/// sorted.
fn find_cycle(graph: &DiGraph<ObjectName, ()>) -> Vec<String> {
    let mut cycles: Vec<Vec<String>> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut names: Vec<String> = scc.iter().map(|&idx| graph[idx].to_string()).collect();
            names.sort();
            names
        })
        .collect();
    cycles.sort();
    cycles.into_iter().next().unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::testing::{name, spec};

    fn store(specs: Vec<crate::types::object::ObjectSpec>) -> ObjectStore {
        let mut store = ObjectStore::in_memory();
        store.register_all(specs).unwrap();
        store
    }

    fn names(order: &[ObjectName]) -> Vec<String> {
        order.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let s = store(vec![
            spec("__a/1", &["__b/1"]),
            spec("__b/1", &["__c/1"]),
            spec("__c/1", &[]),
        ]);
        let resolver = DependencyResolver::new(&s).unwrap();
        assert_eq!(names(resolver.order()), vec!["__c/1", "__b/1", "__a/1"]);
    }

    #[test]
    fn independent_objects_keep_name_order() {
        let s = store(vec![spec("__pkg/b", &[]), spec("__pkg/a", &[]), spec("__file/z", &[])]);
        let order: Vec<String> = DependencyResolver::new(&s)
            .unwrap()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(order, vec!["__file/z", "__pkg/a", "__pkg/b"]);
    }

    #[test]
    fn autorequire_counts_as_edge() {
        let mut s = store(vec![spec("__app/web", &[]), spec("__pkg/nginx", &[])]);
        s.add_autorequire(&name("__app/web"), &[name("__pkg/nginx")]).unwrap();
        let resolver = DependencyResolver::new(&s).unwrap();
        assert_eq!(names(resolver.order()), vec!["__pkg/nginx", "__app/web"]);
        assert_eq!(resolver.dependencies(&name("__app/web")), &[name("__pkg/nginx")]);
        assert!(resolver.dependencies(&name("__pkg/nginx")).is_empty());
    }

    #[test]
    fn cycle_fails_with_its_members() {
        let s = store(vec![
            spec("__x/a", &["__x/b"]),
            spec("__x/b", &["__x/a"]),
            spec("__x/c", &[]),
        ]);
        match DependencyResolver::new(&s) {
            Err(CdistError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["__x/a", "__x/b"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_requirement_fails() {
        let s = store(vec![spec("__file/x", &["__pkg/gone"])]);
        assert!(matches!(
            DependencyResolver::new(&s),
            Err(CdistError::MissingRequirement { ref requirement, .. }) if requirement == "__pkg/gone"
        ));
    }

    #[test]
    fn empty_store_resolves_to_nothing() {
        let resolver = DependencyResolver::new(&ObjectStore::in_memory()).unwrap();
        assert!(resolver.order().is_empty());
    }
}
