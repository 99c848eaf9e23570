//! Builder for constructing state trees.

use crate::builder::error::BuildError;
use crate::builder::transition::TransitionBuilder;
use crate::core::{HistoryType, Identifier};
use crate::engine::{BoxError, Edge, StateTree, Transition};
use std::collections::BTreeMap;
use std::sync::Arc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<BuildError>>;

struct Composite<S> {
    substates: Vec<S>,
    initial: S,
    history: HistoryType,
}

/// Builder for constructing a validated [`StateTree`] with a fluent API.
///
/// States are registered on first reference, whether through
/// [`state`](Self::state), a handler, a transition or a substate declaration.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::{StateMachineBuilder, TransitionBuilder};
/// use statecraft::core::HistoryType;
///
/// let tree = StateMachineBuilder::new()
///     .substates("player", ["stopped", "playing"], "stopped", HistoryType::Shallow)
///     .transition(TransitionBuilder::new().from("stopped").on("play").to("playing"))?
///     .transition(TransitionBuilder::new().from("playing").on("stop").to("stopped"))?
///     .build()?;
///
/// assert_eq!(tree.superstate(&"playing"), Some(&"player"));
/// assert_eq!(tree.initial_substate(&"player"), Some(&"stopped"));
/// # Ok::<(), statecraft::builder::BuildError>(())
/// ```
pub struct StateMachineBuilder<S: Identifier, E: Identifier> {
    tree: StateTree<S, E>,
    composites: BTreeMap<S, Composite<S>>,
}

impl<S: Identifier, E: Identifier> StateMachineBuilder<S, E> {
    pub fn new() -> Self {
        Self {
            tree: StateTree::new(),
            composites: BTreeMap::new(),
        }
    }

    /// Register a state without handlers.
    pub fn state(mut self, state: S) -> Self {
        self.tree.register(state);
        self
    }

    /// Set the entry handler of `state`, replacing any previous one.
    pub fn on_entry<F>(mut self, state: S, handler: F) -> Self
    where
        F: Fn(&S) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let index = self.tree.register(state);
        self.tree.node_mut(index).entry = Some(Arc::new(handler));
        self
    }

    /// Set the exit handler of `state`, replacing any previous one.
    pub fn on_exit<F>(mut self, state: S, handler: F) -> Self
    where
        F: Fn(&S) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let index = self.tree.register(state);
        self.tree.node_mut(index).exit = Some(Arc::new(handler));
        self
    }

    /// Declare `parent` as a composite of `substates`, entered through
    /// `initial` unless `history` says otherwise.
    ///
    /// Declaring the same parent again replaces the earlier declaration.
    pub fn substates<I>(mut self, parent: S, substates: I, initial: S, history: HistoryType) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        self.tree.register(parent.clone());
        self.tree.register(initial.clone());
        let substates: Vec<S> = substates.into_iter().collect();
        for substate in &substates {
            self.tree.register(substate.clone());
        }
        self.composites.insert(
            parent,
            Composite {
                substates,
                initial,
                history,
            },
        );
        self
    }

    /// Add a transition using a builder.
    /// Returns an error if the builder fails validation.
    pub fn transition(self, builder: TransitionBuilder<S, E>) -> Result<Self, BuildError> {
        let transition = builder.build()?;
        Ok(self.add_transition(transition))
    }

    /// Add a pre-built transition. Candidates for the same source and event
    /// are tried in the order they were added.
    pub fn add_transition(mut self, transition: Transition<S, E>) -> Self {
        let source = self.tree.register(transition.source);
        let target = transition.target.map(|target| self.tree.register(target));
        self.tree
            .node_mut(source)
            .transitions
            .entry(transition.event)
            .or_default()
            .push(Edge {
                target,
                guard: transition.guard,
                actions: transition.actions,
            });
        self
    }

    /// Add multiple transitions at once.
    pub fn transitions<I>(self, transitions: I) -> Self
    where
        I: IntoIterator<Item = Transition<S, E>>,
    {
        transitions
            .into_iter()
            .fold(self, |builder, transition| builder.add_transition(transition))
    }

    /// Validate the hierarchy and freeze it.
    ///
    /// All violations are collected; a single violation is returned as is,
    /// several are wrapped in [`BuildError::Invalid`].
    pub fn build(self) -> Result<StateTree<S, E>, BuildError> {
        let Self {
            mut tree,
            composites,
        } = self;

        let mut checks: Vec<Check> = Vec::new();
        let mut parents: BTreeMap<S, S> = BTreeMap::new();

        for (parent, composite) in &composites {
            checks.push(if composite.substates.is_empty() {
                Validation::fail(BuildError::EmptySubstates {
                    state: format!("{parent:?}"),
                })
            } else if !composite.substates.contains(&composite.initial) {
                Validation::fail(BuildError::InitialNotSubstate {
                    state: format!("{parent:?}"),
                    initial: format!("{:?}", composite.initial),
                })
            } else {
                Validation::success(())
            });

            for substate in &composite.substates {
                match parents.get(substate) {
                    Some(first) => checks.push(Validation::fail(BuildError::MultipleSuperstates {
                        state: format!("{substate:?}"),
                        first: format!("{first:?}"),
                        second: format!("{parent:?}"),
                    })),
                    None => {
                        parents.insert(substate.clone(), parent.clone());
                    }
                }
            }
        }

        for (child, parent) in &parents {
            if let (Some(child), Some(parent)) = (tree.index_of(child), tree.index_of(parent)) {
                tree.node_mut(child).superstate = Some(parent);
            }
        }
        checks.extend(cycles(&tree).into_iter().map(|state| {
            Validation::fail(BuildError::Cycle {
                state: format!("{state:?}"),
            })
        }));

        match Validation::all_vec(checks).map(|_| ()) {
            Validation::Failure(errors) => {
                let mut violations: Vec<BuildError> = errors.iter().cloned().collect();
                if violations.len() == 1 {
                    Err(violations.remove(0))
                } else {
                    Err(BuildError::Invalid { violations })
                }
            }
            Validation::Success(()) => {
                for (parent, composite) in composites {
                    let Some(index) = tree.index_of(&parent) else {
                        continue;
                    };
                    let substates: Vec<usize> = composite
                        .substates
                        .iter()
                        .filter_map(|substate| tree.index_of(substate))
                        .collect();
                    let initial = tree.index_of(&composite.initial);
                    let node = tree.node_mut(index);
                    node.substates = substates;
                    node.initial = initial;
                    node.history = composite.history;
                }
                Ok(tree)
            }
        }
    }
}

impl<S: Identifier, E: Identifier> Default for StateMachineBuilder<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// States that reach themselves by following superstate links.
fn cycles<S: Identifier, E: Identifier>(tree: &StateTree<S, E>) -> Vec<S> {
    (0..tree.len())
        .filter(|start| {
            let mut current = tree.node(*start).superstate;
            for _ in 0..tree.len() {
                match current {
                    None => return false,
                    Some(index) if index == *start => return true,
                    Some(index) => current = tree.node(index).superstate,
                }
            }
            false
        })
        .map(|index| tree.node(index).id.clone())
        .collect()
}
