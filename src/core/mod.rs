//! Core vocabulary shared by every machine flavour.
//!
//! This module contains the building blocks that carry no execution policy:
//! - Identifiers for states and events via the `Identifier` trait
//! - History policies for composite states
//! - Guard predicates for transition control
//! - The per-event context passed to guards, actions and subscribers

mod context;
mod guard;
mod history;
mod state;

pub use context::{EventArgs, EventContext, MachineId};
pub use guard::Guard;
pub use history::HistoryType;
pub use state::Identifier;
