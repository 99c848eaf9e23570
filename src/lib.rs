//! Statecraft: hierarchical state machines, passive or active.
//!
//! A machine is described once with the builders and frozen into a
//! [`StateTree`]. The same tree can then drive either flavour:
//!
//! - [`PassiveStateMachine`] dispatches on the caller's thread.
//! - [`ActiveStateMachine`] owns a worker thread and a priority queue of
//!   pending events, delivering notifications to a chosen context.
//!
//! # Core Concepts
//!
//! - **States** form a tree. Composite states have substates, an initial
//!   substate and a history policy (`None`, `Shallow` or `Deep`).
//! - **Transitions** are keyed by source state and event. Candidates are
//!   tried in declaration order, leaf first, then each superstate in turn.
//! - **Guards** are predicates over the [`EventContext`]; **actions** run
//!   between the exits and the entries of a firing transition.
//! - **Notifications** report every dispatch: `BeginDispatch`, then one of
//!   `TransitionDeclined`, `TransitionCompleted` or `ExceptionThrown`.
//!
//! # Example
//!
//! ```rust
//! use statecraft::builder::{StateMachineBuilder, TransitionBuilder};
//! use statecraft::core::HistoryType;
//! use statecraft::identifier_enum;
//! use statecraft::passive::PassiveStateMachine;
//!
//! identifier_enum! {
//!     enum Player { Stopped, Active, Playing, Paused }
//! }
//!
//! identifier_enum! {
//!     enum Command { Play, Pause, Stop }
//! }
//!
//! let tree = StateMachineBuilder::new()
//!     .substates(Player::Active, [Player::Playing, Player::Paused], Player::Playing, HistoryType::Shallow)
//!     .transition(TransitionBuilder::new().from(Player::Stopped).on(Command::Play).to(Player::Active))?
//!     .transition(TransitionBuilder::new().from(Player::Playing).on(Command::Pause).to(Player::Paused))?
//!     .transition(TransitionBuilder::new().from(Player::Paused).on(Command::Play).to(Player::Playing))?
//!     .transition(TransitionBuilder::new().from(Player::Active).on(Command::Stop).to(Player::Stopped))?
//!     .build()?;
//!
//! let mut player = PassiveStateMachine::new(tree);
//! player.initialize(Player::Stopped)?;
//! player.send(Command::Play)?;
//! player.send(Command::Pause)?;
//! player.send(Command::Stop)?;
//! player.send(Command::Play)?;
//!
//! // shallow history brings the player back to where it was stopped
//! assert_eq!(player.current_state(), Some(&Player::Paused));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod active;
pub mod builder;
pub mod collections;
pub mod core;
pub mod engine;
pub mod notify;
pub mod passive;

// Re-export commonly used types
pub use active::{ActiveConfig, ActiveStateMachine, MachineSender, Priority};
pub use builder::{BuildError, StateMachineBuilder, TransitionBuilder};
pub use collections::PriorityQueue;
pub use core::{EventArgs, EventContext, Guard, HistoryType, Identifier, MachineId};
pub use engine::{DispatchOutcome, HandlerError, MachineError, StateTree};
pub use notify::{DeliveryContext, Notification, SubscriptionId};
pub use passive::PassiveStateMachine;
