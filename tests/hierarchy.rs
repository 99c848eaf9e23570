//! Dispatch scenarios on passive machines: flat and nested hierarchies,
//! guards, history and error routing.

use parking_lot::Mutex;
use statecraft::builder::{BuildError, StateMachineBuilder, TransitionBuilder};
use statecraft::core::{EventArgs, HistoryType};
use statecraft::engine::{DispatchOutcome, HandlerKind, MachineError};
use statecraft::identifier_enum;
use statecraft::notify::Notification;
use statecraft::passive::PassiveStateMachine;
use std::sync::Arc;

identifier_enum! {
    enum Job {
        Idle,
        Running,
        Paused,
    }
}

identifier_enum! {
    enum Control {
        Start,
        Pause,
        Resume,
        Stop,
    }
}

fn job_machine() -> PassiveStateMachine<Job, Control> {
    let tree = StateMachineBuilder::new()
        .transition(TransitionBuilder::new().from(Job::Idle).on(Control::Start).to(Job::Running))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Job::Running).on(Control::Pause).to(Job::Paused)))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Job::Paused).on(Control::Resume).to(Job::Running)))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Job::Running).on(Control::Stop).to(Job::Idle)))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Job::Paused).on(Control::Stop).to(Job::Idle)))
        .and_then(|b| b.build())
        .unwrap();
    PassiveStateMachine::new(tree)
}

#[test]
fn idle_running_paused_scenario() {
    let mut machine = job_machine();
    let notifications = machine.subscribe_channel();
    machine.initialize(Job::Idle).unwrap();

    assert!(machine.send(Control::Start).unwrap().is_completed());
    assert_eq!(machine.current_state(), Some(&Job::Running));

    machine.send(Control::Pause).unwrap();
    assert_eq!(machine.current_state(), Some(&Job::Paused));

    assert!(machine.send(Control::Start).unwrap().is_declined());
    assert_eq!(machine.current_state(), Some(&Job::Paused));

    let kinds: Vec<_> = notifications.try_iter().map(|n| n.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "begin_dispatch",
            "transition_completed",
            "begin_dispatch",
            "transition_completed",
            "begin_dispatch",
            "transition_declined",
        ]
    );
}

#[test]
fn rejecting_guard_declines_and_keeps_state() {
    let tree = StateMachineBuilder::new()
        .transition(
            TransitionBuilder::new()
                .from(Job::Idle)
                .on(Control::Start)
                .to(Job::Running)
                .when(|ctx| ctx.args().get::<bool>(0) == Some(&true)),
        )
        .and_then(|b| b.build())
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);
    let notifications = machine.subscribe_channel();
    machine.initialize(Job::Idle).unwrap();

    let outcome = machine.send_with(Control::Start, EventArgs::new().with(false)).unwrap();

    assert!(outcome.is_declined());
    assert_eq!(machine.current_state(), Some(&Job::Idle));
    assert!(notifications
        .try_iter()
        .any(|n| matches!(n, Notification::TransitionDeclined(_))));

    machine.send_with(Control::Start, EventArgs::new().with(true)).unwrap();
    assert_eq!(machine.current_state(), Some(&Job::Running));
}

#[test]
fn first_accepting_candidate_wins_in_declaration_order() {
    let tree = StateMachineBuilder::new()
        .transition(
            TransitionBuilder::new()
                .from(Job::Idle)
                .on(Control::Start)
                .to(Job::Paused)
                .when(|_| false),
        )
        .and_then(|b| b.transition(TransitionBuilder::new().from(Job::Idle).on(Control::Start).to(Job::Running)))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Job::Idle).on(Control::Start).to(Job::Paused)))
        .and_then(|b| b.build())
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);
    machine.initialize(Job::Idle).unwrap();

    machine.send(Control::Start).unwrap();

    assert_eq!(machine.current_state(), Some(&Job::Running));
}

identifier_enum! {
    enum Node {
        Top,
        S1,
        A,
        B,
        Composite,
        C1,
        C2,
        C21,
        C22,
        Outside,
    }
}

identifier_enum! {
    enum Signal {
        Next,
        Deeper,
        Leave,
        Enter,
    }
}

fn nested(history: HistoryType) -> PassiveStateMachine<Node, Signal> {
    let tree = StateMachineBuilder::new()
        .substates(Node::Composite, [Node::C1, Node::C2], Node::C1, history)
        .substates(Node::C2, [Node::C21, Node::C22], Node::C21, HistoryType::None)
        .transition(TransitionBuilder::new().from(Node::C1).on(Signal::Next).to(Node::C2))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Node::C21).on(Signal::Deeper).to(Node::C22)))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Node::Composite).on(Signal::Leave).to(Node::Outside)))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Node::Outside).on(Signal::Enter).to(Node::Composite)))
        .and_then(|b| b.build())
        .unwrap();
    PassiveStateMachine::new(tree)
}

fn visit_c22_then_leave_and_return(machine: &mut PassiveStateMachine<Node, Signal>) {
    machine.initialize(Node::Composite).unwrap();
    assert_eq!(machine.current_state(), Some(&Node::C1));
    for signal in [Signal::Next, Signal::Deeper, Signal::Leave] {
        machine.send(signal).unwrap();
    }
    assert_eq!(machine.current_state(), Some(&Node::Outside));
    machine.send(Signal::Enter).unwrap();
}

#[test]
fn shallow_history_restores_last_direct_substate() {
    let mut machine = nested(HistoryType::Shallow);

    visit_c22_then_leave_and_return(&mut machine);

    // C2 is restored but entered through its own initial substate
    assert_eq!(machine.current_state(), Some(&Node::C21));
}

#[test]
fn deep_history_restores_last_leaf() {
    let mut machine = nested(HistoryType::Deep);

    visit_c22_then_leave_and_return(&mut machine);

    assert_eq!(machine.current_state(), Some(&Node::C22));
}

#[test]
fn no_history_reenters_initial_substate() {
    let mut machine = nested(HistoryType::None);

    visit_c22_then_leave_and_return(&mut machine);

    assert_eq!(machine.current_state(), Some(&Node::C1));
}

#[test]
fn shallow_history_with_leaf_children_resolves_to_last_child() {
    let tree = StateMachineBuilder::new()
        .substates(Node::Composite, [Node::C1, Node::C2], Node::C1, HistoryType::Shallow)
        .transition(TransitionBuilder::new().from(Node::C1).on(Signal::Next).to(Node::C2))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Node::Composite).on(Signal::Leave).to(Node::Outside)))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Node::Outside).on(Signal::Enter).to(Node::Composite)))
        .and_then(|b| b.build())
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);
    machine.initialize(Node::Composite).unwrap();

    machine.send(Signal::Next).unwrap();
    machine.send(Signal::Leave).unwrap();
    machine.send(Signal::Enter).unwrap();

    assert_eq!(machine.current_state(), Some(&Node::C2));
}

#[test]
fn initializing_composite_resolves_initial_leaf() {
    let tree = StateMachineBuilder::<Node, Signal>::new()
        .substates(Node::S1, [Node::A, Node::B], Node::A, HistoryType::None)
        .build()
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);

    assert_eq!(machine.initialize(Node::S1).unwrap(), Node::A);
    assert_eq!(machine.current_state(), Some(&Node::A));
}

#[test]
fn transition_to_active_ancestor_reruns_entries_down_to_resolved_leaf() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut builder = StateMachineBuilder::new()
        .substates(Node::Top, [Node::Composite, Node::Outside], Node::Composite, HistoryType::None)
        .substates(Node::Composite, [Node::C1, Node::C2], Node::C1, HistoryType::Deep);
    for state in [Node::Top, Node::Composite, Node::C1, Node::C2] {
        let entries = Arc::clone(&trace);
        let exits = Arc::clone(&trace);
        builder = builder
            .on_entry(state, move |s| {
                entries.lock().push(format!("+{s}"));
                Ok(())
            })
            .on_exit(state, move |s| {
                exits.lock().push(format!("-{s}"));
                Ok(())
            });
    }
    let tree = builder
        .transition(TransitionBuilder::new().from(Node::C1).on(Signal::Next).to(Node::C2))
        .and_then(|b| b.transition(TransitionBuilder::new().from(Node::C2).on(Signal::Enter).to(Node::Composite)))
        .and_then(|b| b.build())
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);
    machine.initialize(Node::Top).unwrap();
    machine.send(Signal::Next).unwrap();
    trace.lock().clear();

    machine.send(Signal::Enter).unwrap();

    // the target is exited too, and deep history recorded on that exit wins
    assert_eq!(*trace.lock(), vec!["-C2", "-Composite", "+Composite", "+C2"]);
    assert_eq!(machine.current_state(), Some(&Node::C2));
}

#[test]
fn failing_action_is_reported_on_completion() {
    let tree = StateMachineBuilder::new()
        .transition(
            TransitionBuilder::new()
                .from(Job::Idle)
                .on(Control::Start)
                .to(Job::Running)
                .action(|_| Err("spool offline".into())),
        )
        .and_then(|b| b.build())
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);
    let notifications = machine.subscribe_channel();
    machine.initialize(Job::Idle).unwrap();

    machine.send(Control::Start).unwrap();

    assert_eq!(machine.current_state(), Some(&Job::Running));
    let completed = notifications
        .try_iter()
        .find_map(|n| match n {
            Notification::TransitionCompleted(completed) => Some(completed),
            _ => None,
        })
        .unwrap();
    let error = completed.error.unwrap();
    assert_eq!(error.kind(), HandlerKind::Action);
    assert!(error.to_string().contains("spool offline"));
}

#[test]
fn panicking_guard_raises_exception_thrown() {
    let tree = StateMachineBuilder::new()
        .transition(
            TransitionBuilder::new()
                .from(Job::Idle)
                .on(Control::Start)
                .to(Job::Running)
                .when(|_| panic!("sensor unavailable")),
        )
        .and_then(|b| b.build())
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);
    let notifications = machine.subscribe_channel();
    machine.initialize(Job::Idle).unwrap();

    let outcome = machine.send(Control::Start).unwrap();

    assert!(matches!(outcome, DispatchOutcome::Faulted(_)));
    assert_eq!(machine.current_state(), Some(&Job::Idle));
    let thrown = notifications
        .try_iter()
        .find_map(|n| match n {
            Notification::ExceptionThrown(thrown) => Some(thrown),
            _ => None,
        })
        .unwrap();
    assert!(thrown.context.is_some());
    assert!(matches!(thrown.error, MachineError::Handler(ref e) if e.is_panic()));
}

#[test]
fn internal_transition_keeps_state_and_reports_result() {
    let tree = StateMachineBuilder::new()
        .on_exit(Job::Running, |_| Err("must not exit".into()))
        .transition(
            TransitionBuilder::new()
                .from(Job::Running)
                .on(Control::Resume)
                .action_with_result(|ctx| Ok(ctx.args().get::<u32>(0).copied().unwrap_or_default() * 2)),
        )
        .and_then(|b| b.build())
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);
    let notifications = machine.subscribe_channel();
    machine.initialize(Job::Running).unwrap();

    let outcome = machine.send_with(Control::Resume, EventArgs::new().with(21u32)).unwrap();

    assert!(matches!(outcome, DispatchOutcome::Completed { state: Job::Running, error: None }));
    let completed = notifications
        .try_iter()
        .find_map(|n| match n {
            Notification::TransitionCompleted(completed) => Some(completed),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        completed.action_result.and_then(|r| r.downcast_ref::<u32>().copied()),
        Some(42)
    );
}

#[test]
fn misuse_is_reported_to_caller() {
    let mut machine = job_machine();

    assert!(matches!(machine.send(Control::Start), Err(MachineError::NotInitialized)));
    machine.initialize(Job::Idle).unwrap();
    assert!(matches!(machine.initialize(Job::Idle), Err(MachineError::AlreadyInitialized)));
}

#[test]
fn initialization_failure_allows_retry() {
    let attempts = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&attempts);
    let tree = StateMachineBuilder::<Job, Control>::new()
        .on_entry(Job::Idle, move |_| {
            let mut attempts = counter.lock();
            *attempts += 1;
            if *attempts == 1 {
                Err("warming up".into())
            } else {
                Ok(())
            }
        })
        .build()
        .unwrap();
    let mut machine = PassiveStateMachine::new(tree);

    assert!(matches!(
        machine.initialize(Job::Idle),
        Err(MachineError::InitializationFailed(_))
    ));
    assert!(!machine.is_initialized());
    assert_eq!(machine.initialize(Job::Idle).unwrap(), Job::Idle);
}

#[test]
fn invalid_hierarchy_is_rejected_at_build_time() {
    let result = StateMachineBuilder::<Node, Signal>::new()
        .substates(Node::Composite, [Node::C1], Node::C2, HistoryType::None)
        .build();

    assert!(matches!(result, Err(BuildError::InitialNotSubstate { .. })));
}
