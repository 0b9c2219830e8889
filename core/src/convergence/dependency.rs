//! Dependency evaluation.

use tracing::trace;

use crate::data::ObjectStore;
use crate::types::object::{CdistObject, ObjectName, ObjectState};


/// True when every name in `references` is a known object in state `done`.
///
/// A reference to an object that does not exist yet is unsatisfied, not an
/// error: a later manifest may still declare it. Pure over the store's
/// current state.
pub fn requirements_satisfied(
    store: &ObjectStore,
    object: &CdistObject,
    references: &[ObjectName],
) -> bool {
    for reference in references {
        match store.state(reference) {
            Some(ObjectState::Done) => {}
            state => {
                trace!(object = %object.name, waiting_for = %reference, ?state, "requirement unsatisfied");
                return false;
            }
        }
    }
    true
}


#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ObjectName {
        s.parse().unwrap()
    }

    fn store_with(objects: &[(&str, ObjectState)]) -> ObjectStore {
        let mut store = ObjectStore::in_memory();
        for (n, state) in objects {
            store.create(name(n), Vec::new()).unwrap();
            if *state != ObjectState::Undefined {
                store.set_state(&name(n), ObjectState::Prepared).unwrap();
            }
            if *state == ObjectState::Done {
                store.set_state(&name(n), ObjectState::Done).unwrap();
            }
        }
        store
    }

    #[test]
    fn empty_list_is_satisfied() {
        let store = ObjectStore::in_memory();
        let obj = CdistObject::new(name("__a/x"), Vec::new());
        assert!(requirements_satisfied(&store, &obj, &[]));
    }

    #[test]
    fn only_done_counts() {
        let store = store_with(&[
            ("__pkg/a", ObjectState::Done),
            ("__pkg/b", ObjectState::Prepared),
        ]);
        let obj = CdistObject::new(name("__file/x"), Vec::new());
        assert!(requirements_satisfied(&store, &obj, &[name("__pkg/a")]));
        assert!(!requirements_satisfied(&store, &obj, &[name("__pkg/a"), name("__pkg/b")]));
    }

    #[test]
    fn missing_reference_is_unsatisfied_not_error() {
        let store = store_with(&[("__pkg/a", ObjectState::Done)]);
        let obj = CdistObject::new(name("__file/x"), Vec::new());
        assert!(!requirements_satisfied(&store, &obj, &[name("__pkg/later")]));
    }

    #[test]
    fn predicate_is_idempotent() {
        let store = store_with(&[
            ("__pkg/a", ObjectState::Done),
            ("__pkg/b", ObjectState::Undefined),
        ]);
        let obj = CdistObject::new(name("__file/x"), Vec::new());
        let refs = [name("__pkg/a"), name("__pkg/b")];
        let first = requirements_satisfied(&store, &obj, &refs);
        for _ in 0..5 {
            assert_eq!(requirements_satisfied(&store, &obj, &refs), first);
        }
        assert!(requirements_satisfied(&store, &obj, &refs[..1]));
        assert!(requirements_satisfied(&store, &obj, &refs[..1]));
    }
}
