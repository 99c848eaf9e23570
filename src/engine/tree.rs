//! Arena-backed state hierarchy.
//!
//! States are stored in a single vector and refer to each other by index.
//! A `StateTree` is produced by the builder after validation and is never
//! mutated afterwards; per-machine history bookkeeping lives in the machine.

use super::transition::{StateHandler, TransitionAction};
use crate::core::{Guard, HistoryType, Identifier};
use std::collections::BTreeMap;

/// Outgoing edge with its target resolved to an arena index.
pub(crate) struct Edge<S, E> {
    pub(crate) target: Option<usize>,
    pub(crate) guard: Option<Guard<S, E>>,
    pub(crate) actions: Vec<TransitionAction<S, E>>,
}

impl<S, E> Clone for Edge<S, E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            guard: self.guard.clone(),
            actions: self.actions.clone(),
        }
    }
}

pub(crate) struct StateNode<S, E> {
    pub(crate) id: S,
    pub(crate) entry: Option<StateHandler<S>>,
    pub(crate) exit: Option<StateHandler<S>>,
    pub(crate) transitions: BTreeMap<E, Vec<Edge<S, E>>>,
    pub(crate) substates: Vec<usize>,
    pub(crate) superstate: Option<usize>,
    pub(crate) initial: Option<usize>,
    pub(crate) history: HistoryType,
}

impl<S, E> StateNode<S, E> {
    fn new(id: S) -> Self {
        Self {
            id,
            entry: None,
            exit: None,
            transitions: BTreeMap::new(),
            substates: Vec::new(),
            superstate: None,
            initial: None,
            history: HistoryType::None,
        }
    }
}

/// Validated, immutable hierarchy of states and their transition tables.
pub struct StateTree<S, E> {
    nodes: Vec<StateNode<S, E>>,
    index: BTreeMap<S, usize>,
}

impl<S: Identifier, E: Identifier> StateTree<S, E> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Index of `id`, creating an empty node on first reference.
    pub(crate) fn register(&mut self, id: S) -> usize {
        if let Some(index) = self.index.get(&id) {
            return *index;
        }
        let index = self.nodes.len();
        self.index.insert(id.clone(), index);
        self.nodes.push(StateNode::new(id));
        index
    }

    pub(crate) fn index_of(&self, id: &S) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn node(&self, index: usize) -> &StateNode<S, E> {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut StateNode<S, E> {
        &mut self.nodes[index]
    }

    /// `index` followed by each of its superstates up to the root.
    pub(crate) fn lineage(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(index), move |current| self.nodes[*current].superstate)
    }

    /// Number of registered states.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &S) -> bool {
        self.index.contains_key(id)
    }

    /// Registered state identifiers in ascending order.
    pub fn states(&self) -> impl Iterator<Item = &S> + '_ {
        self.index.keys()
    }

    pub fn superstate(&self, id: &S) -> Option<&S> {
        let parent = self.node(self.index_of(id)?).superstate?;
        Some(&self.node(parent).id)
    }

    /// Direct substates of `id` in declaration order.
    pub fn substates(&self, id: &S) -> Vec<&S> {
        self.index_of(id)
            .map(|index| {
                self.node(index)
                    .substates
                    .iter()
                    .map(|child| &self.node(*child).id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn initial_substate(&self, id: &S) -> Option<&S> {
        let initial = self.node(self.index_of(id)?).initial?;
        Some(&self.node(initial).id)
    }

    pub fn history(&self, id: &S) -> Option<HistoryType> {
        self.index_of(id).map(|index| self.node(index).history)
    }

    pub fn is_composite(&self, id: &S) -> bool {
        self.index_of(id)
            .is_some_and(|index| !self.node(index).substates.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let mut tree: StateTree<&'static str, u8> = StateTree::new();
        let first = tree.register("idle");
        let again = tree.register("idle");
        let other = tree.register("busy");

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn lineage_walks_to_root() {
        let mut tree: StateTree<&'static str, u8> = StateTree::new();
        let root = tree.register("root");
        let middle = tree.register("middle");
        let leaf = tree.register("leaf");
        tree.node_mut(middle).superstate = Some(root);
        tree.node_mut(leaf).superstate = Some(middle);

        assert_eq!(tree.lineage(leaf).collect::<Vec<_>>(), vec![leaf, middle, root]);
        assert_eq!(tree.lineage(root).collect::<Vec<_>>(), vec![root]);
        assert_eq!(tree.superstate(&"leaf"), Some(&"middle"));
        assert_eq!(tree.superstate(&"root"), None);
    }

    #[test]
    fn unknown_states_have_no_structure() {
        let tree: StateTree<&'static str, u8> = StateTree::new();

        assert!(tree.is_empty());
        assert!(!tree.contains(&"ghost"));
        assert!(tree.substates(&"ghost").is_empty());
        assert_eq!(tree.history(&"ghost"), None);
        assert!(!tree.is_composite(&"ghost"));
    }
}
