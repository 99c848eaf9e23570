//! Dispatch engine shared by the passive and active machines.
//!
//! The engine owns a frozen [`StateTree`], the current leaf and the
//! per-composite history record. It never blocks and never spawns; callers
//! decide which thread drives it.

use super::error::{panic_message, BoxError, HandlerError, HandlerKind, MachineError};
use super::transition::ActionResult;
use super::tree::{Edge, StateTree};
use crate::core::{EventArgs, EventContext, HistoryType, Identifier, MachineId};
use crate::notify::{ExceptionThrown, Notification, NotificationSink, TransitionCompleted};
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What a single dispatch did. Mirrors the notification raised for it.
#[derive(Clone, Debug)]
pub enum DispatchOutcome<S> {
    /// A transition fired. `error` holds the first handler failure captured
    /// during the exit/action/entry sequence.
    Completed {
        state: S,
        error: Option<HandlerError>,
    },

    /// No transition accepted the event; the state is unchanged.
    Declined,

    /// A guard failed before any transition was chosen; the state is
    /// unchanged.
    Faulted(HandlerError),
}

impl<S> DispatchOutcome<S> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined)
    }

    /// Leaf state after a completed transition.
    pub fn state(&self) -> Option<&S> {
        match self {
            Self::Completed { state, .. } => Some(state),
            _ => None,
        }
    }
}

/// First error wins; the sequence keeps running so the machine always lands
/// in a consistent leaf.
#[derive(Default)]
struct Sequence {
    error: Option<HandlerError>,
}

impl Sequence {
    fn record(&mut self, result: Result<(), HandlerError>) {
        if let Err(error) = result {
            self.error.get_or_insert(error);
        }
    }
}

struct Fired {
    leaf: usize,
    action_result: Option<ActionResult>,
    error: Option<HandlerError>,
}

/// Hierarchical state machine engine.
pub struct StateMachine<S: Identifier, E: Identifier> {
    id: MachineId,
    tree: StateTree<S, E>,
    /// Last active direct substate per composite, indexed like the tree.
    history: Vec<Option<usize>>,
    current: Option<usize>,
    sink: Arc<dyn NotificationSink<S, E>>,
}

impl<S: Identifier, E: Identifier> StateMachine<S, E> {
    pub fn new(tree: StateTree<S, E>, sink: Arc<dyn NotificationSink<S, E>>) -> Self {
        Self::with_id(MachineId::new(), tree, sink)
    }

    pub fn with_id(
        id: MachineId,
        tree: StateTree<S, E>,
        sink: Arc<dyn NotificationSink<S, E>>,
    ) -> Self {
        Self {
            id,
            history: vec![None; tree.len()],
            tree,
            current: None,
            sink,
        }
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn tree(&self) -> &StateTree<S, E> {
        &self.tree
    }

    /// Current leaf state, `None` before initialization.
    pub fn current_state(&self) -> Option<&S> {
        self.current.map(|index| &self.tree.node(index).id)
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    /// Enter `initial` (through its superstates, then down to a leaf) and
    /// return the leaf reached.
    ///
    /// A failing entry handler aborts initialization and leaves the machine
    /// uninitialized.
    pub fn initialize(&mut self, initial: S) -> Result<S, MachineError> {
        if self.current.is_some() {
            return Err(MachineError::AlreadyInitialized);
        }
        let target = self
            .tree
            .index_of(&initial)
            .ok_or_else(|| MachineError::UnknownState(format!("{initial:?}")))?;

        let mut sequence = Sequence::default();
        for index in self.entry_path(None, target) {
            self.enter(index, &mut sequence);
        }
        let leaf = self.enter_by_history(target, &mut sequence);
        if let Some(error) = sequence.error {
            warn!(machine = %self.id, state = ?initial, %error, "initialization failed");
            return Err(MachineError::InitializationFailed(error));
        }

        self.current = Some(leaf);
        let state = self.tree.node(leaf).id.clone();
        debug!(machine = %self.id, state = ?state, "state machine initialized");
        Ok(state)
    }

    /// Dispatch one event from the current leaf.
    ///
    /// Only configuration problems are returned as `Err`; handler failures are
    /// reported through notifications and the returned outcome.
    pub fn dispatch(&mut self, event: E, args: EventArgs) -> Result<DispatchOutcome<S>, MachineError> {
        let leaf = self.current.ok_or(MachineError::NotInitialized)?;
        let context = Arc::new(EventContext::new(
            self.id,
            self.tree.node(leaf).id.clone(),
            event,
            args,
        ));
        self.sink
            .publish(Notification::BeginDispatch(Arc::clone(&context)));

        let outcome = match self.select(leaf, &context) {
            Err(error) => {
                warn!(machine = %self.id, event = ?context.event(), %error, "guard failed");
                self.report(Some(Arc::clone(&context)), MachineError::Handler(error.clone()));
                DispatchOutcome::Faulted(error)
            }
            Ok(None) => {
                debug!(
                    machine = %self.id,
                    state = ?context.source(),
                    event = ?context.event(),
                    "transition declined"
                );
                self.sink.publish(Notification::TransitionDeclined(context));
                DispatchOutcome::Declined
            }
            Ok(Some((owner, edge))) => {
                let fired = self.fire(leaf, owner, &edge, &context);
                self.current = Some(fired.leaf);
                let state = self.tree.node(fired.leaf).id.clone();
                debug!(
                    machine = %self.id,
                    from = ?context.source(),
                    to = ?state,
                    event = ?context.event(),
                    failed = fired.error.is_some(),
                    "transition completed"
                );
                self.sink
                    .publish(Notification::TransitionCompleted(TransitionCompleted {
                        state: state.clone(),
                        context,
                        action_result: fired.action_result,
                        error: fired.error.clone(),
                    }));
                DispatchOutcome::Completed {
                    state,
                    error: fired.error,
                }
            }
        };
        Ok(outcome)
    }

    /// Raise `ExceptionThrown` for a failure outside the transition sequence.
    pub fn report(&self, context: Option<Arc<EventContext<S, E>>>, error: MachineError) {
        self.sink
            .publish(Notification::ExceptionThrown(ExceptionThrown { context, error }));
    }

    /// Walk from the leaf towards the root and pick the first candidate whose
    /// guard accepts, in declaration order at each level.
    fn select(
        &self,
        leaf: usize,
        context: &EventContext<S, E>,
    ) -> Result<Option<(usize, Edge<S, E>)>, HandlerError> {
        for index in self.tree.lineage(leaf) {
            let node = self.tree.node(index);
            let Some(candidates) = node.transitions.get(context.event()) else {
                continue;
            };
            for edge in candidates {
                let accepted = match &edge.guard {
                    None => true,
                    Some(guard) => invoke(HandlerKind::Guard, &node.id, || Ok(guard.check(context)))?,
                };
                if accepted {
                    return Ok(Some((index, edge.clone())));
                }
            }
        }
        Ok(None)
    }

    fn fire(
        &mut self,
        leaf: usize,
        owner: usize,
        edge: &Edge<S, E>,
        context: &EventContext<S, E>,
    ) -> Fired {
        let mut sequence = Sequence::default();

        let Some(target) = edge.target else {
            let action_result = self.run_actions(owner, edge, context, &mut sequence);
            return Fired {
                leaf,
                action_result,
                error: sequence.error,
            };
        };

        let boundary = self.exit_boundary(leaf, target);
        let exiting: Vec<usize> = self
            .tree
            .lineage(leaf)
            .take_while(|index| Some(*index) != boundary)
            .collect();
        for index in exiting {
            self.exit(index, &mut sequence);
        }

        let action_result = self.run_actions(owner, edge, context, &mut sequence);

        for index in self.entry_path(boundary, target) {
            self.enter(index, &mut sequence);
        }
        let leaf = self.enter_by_history(target, &mut sequence);

        Fired {
            leaf,
            action_result,
            error: sequence.error,
        }
    }

    /// Run actions in order, stopping at the first failure. Returns the last
    /// value produced.
    fn run_actions(
        &self,
        owner: usize,
        edge: &Edge<S, E>,
        context: &EventContext<S, E>,
        sequence: &mut Sequence,
    ) -> Option<ActionResult> {
        let source = &self.tree.node(owner).id;
        let mut produced = None;
        for action in &edge.actions {
            match invoke(HandlerKind::Action, source, || action(context)) {
                Ok(Some(result)) => produced = Some(result),
                Ok(None) => {}
                Err(error) => {
                    sequence.record(Err(error));
                    break;
                }
            }
        }
        produced
    }

    /// Deepest proper ancestor of `target` that is still on the active path
    /// from `leaf`. Everything below it is exited, so a target that is the
    /// leaf itself or one of its ancestors is always exited and re-entered.
    fn exit_boundary(&self, leaf: usize, target: usize) -> Option<usize> {
        let active: Vec<usize> = self.tree.lineage(leaf).collect();
        self.tree
            .lineage(target)
            .skip(1)
            .find(|ancestor| active.contains(ancestor))
    }

    /// Proper ancestors of `target` below `boundary`, outermost first.
    fn entry_path(&self, boundary: Option<usize>, target: usize) -> Vec<usize> {
        let mut path: Vec<usize> = self
            .tree
            .lineage(target)
            .skip(1)
            .take_while(|index| Some(*index) != boundary)
            .collect();
        path.reverse();
        path
    }

    /// Enter `index` and descend to the leaf its history policy selects.
    fn enter_by_history(&self, index: usize, sequence: &mut Sequence) -> usize {
        self.enter(index, sequence);
        let node = self.tree.node(index);
        let Some(initial) = node.initial else {
            return index;
        };
        let remembered = self.history[index].unwrap_or(initial);
        match node.history {
            HistoryType::None => self.enter_by_history(initial, sequence),
            HistoryType::Shallow => self.enter_shallow(remembered, sequence),
            HistoryType::Deep => self.enter_deep(remembered, sequence),
        }
    }

    fn enter_shallow(&self, index: usize, sequence: &mut Sequence) -> usize {
        self.enter(index, sequence);
        match self.tree.node(index).initial {
            None => index,
            Some(initial) => self.enter_shallow(initial, sequence),
        }
    }

    fn enter_deep(&self, index: usize, sequence: &mut Sequence) -> usize {
        self.enter(index, sequence);
        match self.tree.node(index).initial {
            None => index,
            Some(initial) => self.enter_deep(self.history[index].unwrap_or(initial), sequence),
        }
    }

    fn enter(&self, index: usize, sequence: &mut Sequence) {
        let node = self.tree.node(index);
        trace!(machine = %self.id, state = ?node.id, "enter");
        if let Some(handler) = &node.entry {
            sequence.record(invoke(HandlerKind::Entry, &node.id, || handler(&node.id)));
        }
    }

    fn exit(&mut self, index: usize, sequence: &mut Sequence) {
        let node = self.tree.node(index);
        trace!(machine = %self.id, state = ?node.id, "exit");
        if let Some(handler) = &node.exit {
            sequence.record(invoke(HandlerKind::Exit, &node.id, || handler(&node.id)));
        }
        if let Some(parent) = node.superstate {
            self.history[parent] = Some(index);
        }
    }
}

/// Run user code, converting both returned errors and panics into
/// [`HandlerError`].
fn invoke<T, S: Debug>(
    kind: HandlerKind,
    state: &S,
    handler: impl FnOnce() -> Result<T, BoxError>,
) -> Result<T, HandlerError> {
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(HandlerError::Failed {
            kind,
            state: format!("{state:?}"),
            source: Arc::from(source),
        }),
        Err(payload) => Err(HandlerError::Panicked {
            kind,
            state: format!("{state:?}"),
            message: panic_message(&*payload),
        }),
    }
}
